pub mod checkout;
pub mod locks;
