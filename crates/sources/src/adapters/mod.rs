pub mod cred;
pub mod gpay;
pub mod paytm;
pub mod phonepe;
