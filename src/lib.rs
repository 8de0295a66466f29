pub mod chat;
pub mod config;
pub mod docx;
pub mod error;
pub mod generate;
pub mod sections;
pub mod server;
pub mod service;
pub mod session;
pub mod textutil;

pub use config::Settings;
pub use server::run_server;
pub use service::AssignmentService;
