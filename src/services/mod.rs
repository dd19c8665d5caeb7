pub mod fraud;
pub mod notify;
pub mod payments;
pub mod phash;
pub mod reports;
pub mod similarity;
pub mod storage;
