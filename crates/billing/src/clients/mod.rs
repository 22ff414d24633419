pub mod bill_client;

pub use bill_client::BillClient;
