mod error;
mod shutdown;

pub mod prelude {
    pub use crate::error::{ScenarioPanicError, TimeoutError};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
