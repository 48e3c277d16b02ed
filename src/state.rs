use crate::{
    config::AppConfig,
    db::DbPool,
    services::{profile::ProfileService, trips::TripService},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub trips: TripService,
    pub profiles: ProfileService,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        Self {
            trips: TripService::new(db.clone(), config.update_timeout),
            profiles: ProfileService::new(db.clone()),
            config,
            db,
        }
    }
}
