// Application layer: the ledger service and the request-facing types around it.

pub mod error;
pub mod locks;
pub mod purchase;
pub mod service;

pub use error::*;
pub use locks::*;
pub use purchase::*;
pub use service::*;
