pub mod qr;
pub mod registry;
pub mod storage;
pub mod upload_service;
