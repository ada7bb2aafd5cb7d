pub use super::check_in::Entity as CheckIn;
pub use super::recipient::Entity as Recipient;
pub use super::user::Entity as User;
