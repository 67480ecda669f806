pub mod account;
pub mod intake;

pub use account::AccountService;
pub use intake::OrderIntake;
