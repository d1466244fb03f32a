pub mod store;

pub use store::ReportStore;
