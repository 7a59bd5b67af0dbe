use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::IdentityVerifier;
use crate::config::Config;
use crate::feed::FeedService;
use crate::transcribe::Transcriber;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub feed: FeedService,
    pub identity: Arc<dyn IdentityVerifier>,
    pub transcriber: Arc<dyn Transcriber>,
}
