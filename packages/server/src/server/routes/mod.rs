// HTTP routes
pub mod health;
pub mod results;
pub mod sessions;
pub mod stream;

pub use health::*;
pub use results::*;
pub use sessions::*;
pub use stream::*;
