pub mod app_config;
pub mod database;
pub mod error;
pub mod order_repo;
pub mod delivery_repo;
pub mod notification_repo;
pub mod user_repo;
pub mod mpesa;
pub mod mailer;
pub mod stores;

pub use database::DbClient;
pub use error::StoreError;
pub use order_repo::StoreOrderRepository;
pub use delivery_repo::StoreDeliveryRepository;
pub use notification_repo::StoreNotificationRepository;
pub use user_repo::StoreContactDirectory;
pub use mpesa::MpesaGateway;
pub use mailer::HttpMailRelay;
pub use stores::Stores;
