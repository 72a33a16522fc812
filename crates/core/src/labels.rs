//! Status label vocabularies per object family.
//!
//! Labels outside these sets are opaque; the poller treats them as fatal
//! unless a caller lists them as pending.

pub mod cluster {
    pub const PENDING: &str = "Pending";
    pub const CREATING: &str = "Creating";
    pub const RUNNING: &str = "Running";
    pub const UPGRADING: &str = "Upgrading";
    pub const TERMINATING: &str = "Terminating";
    pub const TERMINATED: &str = "Terminated";
}

pub mod job {
    pub const QUEUED: &str = "queued";
    pub const EXECUTING: &str = "executing";
    pub const FAILED: &str = "failed";
    pub const COMPLETE: &str = "complete";
}

pub mod agent {
    pub const ACTIVE: &str = "active";
    pub const ABSENT: &str = "absent";
}
