pub mod action;
pub mod automation;
pub mod progress;
pub mod requests;
pub mod responses;
pub mod session;

pub use action::*;
pub use automation::*;
pub use progress::*;
pub use requests::*;
pub use responses::*;
pub use session::*;
