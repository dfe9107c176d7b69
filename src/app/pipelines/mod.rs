pub mod gsheets_etl;

pub use gsheets_etl::GSheetsEtl;
