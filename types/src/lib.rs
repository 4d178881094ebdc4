pub mod audio;
pub mod events;
pub mod session;
mod content;

pub use content::{Blob, Content, Part};
pub use events::{ClientEvent, ServerEvent};
pub use session::{Setup, SetupConfigurator};
