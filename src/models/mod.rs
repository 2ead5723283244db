pub mod assistant;
pub mod message;
pub mod run;
pub mod sync;
pub mod thread;

pub use assistant::Assistant;
pub use message::{Message, NewMessage, Role};
pub use run::{RunEvent, RunStream, UpstreamMessage};
pub use sync::SyncResponse;
pub use thread::Thread;
