use super::{Session, TransferTicket};

/// Ownership of the admission slot for one request.
///
/// Dropping the lease releases the slot. If a transfer was begun but never
/// settled (peer went away, stream dropped), the attempt is marked failed first.
pub struct PeerLease {
    session: Session,
    peer: String,
    epoch: u64,
    ticket: Option<TransferTicket>,
    settled: bool,
}

impl PeerLease {
    pub(super) fn new(session: Session, peer: &str, epoch: u64) -> Self {
        Self {
            session,
            peer: peer.to_string(),
            epoch,
            ticket: None,
            settled: false,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ticket(&self) -> Option<&TransferTicket> {
        self.ticket.as_ref()
    }

    /// Start the transfer attempt this lease covers.
    pub fn begin(&mut self, total_size: u64) {
        self.ticket = Some(self.session.begin_transfer(&self.peer, total_size));
        self.settled = false;
    }

    pub fn progress(&self, transferred: u64) {
        if let Some(ticket) = &self.ticket {
            self.session.record_progress(ticket, transferred);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.ticket.as_ref().is_some_and(TransferTicket::is_cancelled)
    }

    pub fn complete(&mut self, final_size: Option<u64>) -> bool {
        self.settled = true;
        match &self.ticket {
            Some(ticket) => self.session.complete(ticket, final_size),
            None => false,
        }
    }

    pub fn fail(&mut self, message: &str) -> bool {
        self.settled = true;
        match &self.ticket {
            Some(ticket) => self.session.fail(ticket, message),
            None => false,
        }
    }
}

impl Drop for PeerLease {
    fn drop(&mut self) {
        if !self.settled {
            if let Some(ticket) = &self.ticket {
                self.session
                    .fail(ticket, "connection closed before the transfer finished");
            }
        }
        self.session.release(&self.peer, self.epoch);
    }
}
