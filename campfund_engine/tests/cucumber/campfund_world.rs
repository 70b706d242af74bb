use std::collections::HashMap;

use campfund_engine::{
    db_types::OrderCode,
    test_utils::{
        fixtures::HOLDING_ACCOUNT,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    CampaignScheduler,
    IdempotencyGuard,
    IngestionResult,
    MemoryCache,
    ReconciliationApi,
    SchedulerConfig,
    SqliteDatabase,
    WebhookIngestor,
};
use cucumber::{event::ScenarioFinished, World};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

#[derive(Default, Debug, World)]
pub struct CampfundWorld {
    pub system: Option<LedgerSystem>,
}

pub struct LedgerSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub ingestor: WebhookIngestor<SqliteDatabase, MemoryCache>,
    pub scheduler: CampaignScheduler<SqliteDatabase>,
    /// Campaign ids by the name the scenario gave them
    pub campaigns: HashMap<String, i64>,
    /// Order codes by donation name
    pub order_codes: HashMap<String, OrderCode>,
    pub last_result: Option<IngestionResult>,
}

impl std::fmt::Debug for LedgerSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerSystem ({})", self.db_path)
    }
}

impl CampfundWorld {
    pub fn system(&self) -> &LedgerSystem {
        self.system.as_ref().expect("Ledger not initialised. Start the scenario with 'Given a fresh install'")
    }

    pub fn system_mut(&mut self) -> &mut LedgerSystem {
        self.system.as_mut().expect("Ledger not initialised. Start the scenario with 'Given a fresh install'")
    }

    pub fn campaign_id(&self, name: &str) -> i64 {
        *self.system().campaigns.get(name).unwrap_or_else(|| panic!("No campaign called {name}"))
    }

    pub fn order_code(&self, donation: &str) -> OrderCode {
        self.system().order_codes.get(donation).cloned().unwrap_or_else(|| panic!("No donation called {donation}"))
    }

    /// Drops the scenario's ledger if every step passed. A failed scenario keeps its database for inspection.
    pub async fn after_scenario(scenario: &str, ev: &ScenarioFinished, world: Option<&mut CampfundWorld>) {
        let Some(sys) = world.and_then(|w| w.system.as_mut()) else {
            trace!("🧪️ \"{scenario}\" left no ledger behind");
            return;
        };
        match ev {
            ScenarioFinished::StepPassed => sys.teardown().await,
            ScenarioFinished::StepFailed(..) | ScenarioFinished::StepSkipped => {
                error!("🧪️ \"{scenario}\" did not pass. Its ledger is kept at {}", sys.db_path);
            },
            _ => trace!("🧪️ Nothing to clean up after {ev:?}"),
        }
    }
}

impl LedgerSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        create_database(&url).await;
        run_migrations(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let api = ReconciliationApi::new(db.clone(), HOLDING_ACCOUNT);
        let ingestor = WebhookIngestor::new(IdempotencyGuard::new(MemoryCache::new()), api);
        let scheduler = CampaignScheduler::new(db.clone(), SchedulerConfig::default());
        Self {
            db_path: url,
            db,
            ingestor,
            scheduler,
            campaigns: HashMap::new(),
            order_codes: HashMap::new(),
            last_result: None,
        }
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.db.close().await {
            error!("🧪️ Failed to close {}: {e}", self.db_path);
        }
        if let Err(e) = Sqlite::drop_database(&self.db_path).await {
            warn!("🧪️ Could not remove {}: {e}", self.db_path);
        }
    }
}
