pub mod inquiry;
pub mod order;
pub mod product;
pub mod profile;
pub mod user;

pub use inquiry::*;
pub use order::*;
pub use product::*;
pub use profile::*;
pub use user::*;
