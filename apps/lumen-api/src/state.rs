use std::sync::Arc;

use lumen_service::LumenService;
use lumen_storage::{db::Db, events::PgEventStore, tasks::PgTaskCatalog};

use crate::routes::RouteTable;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<LumenService>,
	pub routes: Arc<RouteTable>,
}
impl AppState {
	pub async fn new(config: lumen_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let store = PgEventStore::new(db.clone());
		let tasks = PgTaskCatalog::new(db);
		let service = LumenService::new(config, Arc::new(store), Arc::new(tasks));

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: LumenService) -> Self {
		Self { service: Arc::new(service), routes: Arc::new(RouteTable::standard()) }
	}
}
