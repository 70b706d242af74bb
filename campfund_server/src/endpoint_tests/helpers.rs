use actix_web::{http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use campfund_engine::{
    traits::{Cache, LedgerStore},
    DonationApi,
    IdempotencyGuard,
    ReconciliationApi,
    WebhookIngestor,
};
use log::debug;

use crate::{
    data_objects::JsonResponse,
    routes::{BankFeedWebhookRoute, CreateDonationRoute, PushWebhookRoute},
};

pub const HOLDING_ACCOUNT: &str = "holding-account";

/// Registers every route against `db` and `cache`, the way the server does.
pub fn configure<B, C>(db: B, cache: C) -> impl FnOnce(&mut ServiceConfig)
where
    B: LedgerStore + 'static,
    C: Cache + 'static,
{
    move |cfg| {
        let donation_api = DonationApi::new(db.clone());
        let ingestor = WebhookIngestor::new(IdempotencyGuard::new(cache), ReconciliationApi::new(db, HOLDING_ACCOUNT));
        cfg.app_data(web::Data::new(ingestor))
            .app_data(web::Data::new(donation_api))
            .service(CreateDonationRoute::<B>::new())
            .service(PushWebhookRoute::<B, C>::new())
            .service(BankFeedWebhookRoute::<B, C>::new());
    }
}

pub async fn post_request(
    path: &str,
    body: impl Into<String>,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let req = TestRequest::post()
        .uri(path)
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.into())
        .to_request();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn ack(body: &str) -> JsonResponse {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Not a JSON acknowledgement: {body}. {e}"))
}
