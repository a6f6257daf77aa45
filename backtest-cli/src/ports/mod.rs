pub mod ini_config;
pub mod postgres_data;
pub mod text_report;

pub use ini_config::IniConfigPort;
pub use postgres_data::PostgresDataPort;
pub use text_report::TextReportWriter;
