pub mod hostels;
pub mod webhook;

pub use hostels::api_delete_hostel;
pub use webhook::api_webhook;
