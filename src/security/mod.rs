pub mod admission;
pub mod audit_log;
pub mod credential_store;
pub mod roles;
pub mod storage;
pub mod token_refresh;
pub mod validator;
