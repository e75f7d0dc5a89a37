mod store;
mod sweeper;
mod types;

pub use store::SessionStore;
pub use sweeper::spawn as spawn_sweeper;
pub use types::{
    generate_request_id, PendingRequest, RequestId, Session, SessionId, ViewerAdmission,
    ViewerEvent,
};
