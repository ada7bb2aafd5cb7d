pub mod check_in;
pub mod recipient;
pub mod user;

pub use check_in::Entity as CheckIn;
pub use recipient::Entity as Recipient;
pub use user::Entity as User;

pub mod prelude;
