//! Request handler definitions
//!
//! Define each route and its handler here. Anything longer than a few lines belongs in the engine.
//!
//! Webhook handlers answer 200 for anything the gateway should not resend: duplicates, payloads we cannot use, and
//! transfers the engine chose not to credit. The body's `success` flag says which. Only storage failures produce a 5xx,
//! so that the gateway retries the delivery.
use actix_web::{get, web, HttpResponse, Responder};
use campfund_engine::{
    gateway_objects::GatewayEvent,
    traits::{Cache, LedgerStore},
    DiscardReason,
    DonationApi,
    IngestionResult,
    ReconciliationOutcome,
    WebhookIngestor,
};
use log::*;

use crate::{
    data_objects::{DonationIntentResponse, DonationRequest, JsonResponse},
    errors::ServerError,
    webhooks::{parse_bank_feed_webhook, parse_push_webhook, WebhookPayloadError},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Donations  ----------------------------------------------------
route!(create_donation => Post "/donations" impl LedgerStore);
/// Opens a donation and issues the order code that both gateways will later report against.
///
/// Push-gateway payers are sent to the gateway with the order code. Bank-feed payers must put `transfer_content` (or
/// at least the order code in it) into their transfer description.
pub async fn create_donation<B: LedgerStore>(
    body: web::Json<DonationRequest>,
    api: web::Data<DonationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST donation of {} to campaign {} by {}", request.amount, request.campaign_id, request.donor_id);
    let intent = api.create_donation_intent(request.into()).await.map_err(|e| {
        debug!("💻️ Could not open donation. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(DonationIntentResponse::from(intent)))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(push_webhook => Post "/webhooks/push" impl LedgerStore, Cache);
pub async fn push_webhook<B: LedgerStore, C: Cache>(
    body: web::Bytes,
    ingestor: web::Data<WebhookIngestor<B, C>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received push gateway webhook");
    handle_delivery(parse_push_webhook(&body), ingestor.as_ref()).await
}

route!(bank_feed_webhook => Post "/webhooks/bank-feed" impl LedgerStore, Cache);
pub async fn bank_feed_webhook<B: LedgerStore, C: Cache>(
    body: web::Bytes,
    ingestor: web::Data<WebhookIngestor<B, C>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received bank feed webhook");
    handle_delivery(parse_bank_feed_webhook(&body), ingestor.as_ref()).await
}

async fn handle_delivery<B: LedgerStore, C: Cache>(
    event: Result<GatewayEvent, WebhookPayloadError>,
    ingestor: &WebhookIngestor<B, C>,
) -> Result<HttpResponse, ServerError> {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            warn!("💻️ Ignoring malformed webhook. {e}");
            return Ok(HttpResponse::Ok().json(JsonResponse::failure(e)));
        },
    };
    let result = ingestor.ingest(event).await?;
    Ok(HttpResponse::Ok().json(acknowledgement(&result)))
}

/// Describes the result of a delivery for the gateway's logs.
pub fn acknowledgement(result: &IngestionResult) -> JsonResponse {
    let outcome = match result {
        IngestionResult::Duplicate => return JsonResponse::failure("Duplicate delivery"),
        IngestionResult::Processed(outcome) => outcome,
    };
    match outcome {
        ReconciliationOutcome::Credited { transaction_id, campaign_id, amount, completeness } => JsonResponse::success(
            format!("Credited {amount} to campaign {campaign_id} (transaction {transaction_id}, {completeness})"),
        ),
        ReconciliationOutcome::Supplemented { transaction_id, parent_id, amount, completeness } => {
            JsonResponse::success(format!(
                "Recorded {amount} as supplementary transaction {transaction_id} of {parent_id} ({completeness})"
            ))
        },
        ReconciliationOutcome::Held { holding_entry_id, reason } => {
            JsonResponse::success(format!("Credited to the holding account as entry {holding_entry_id} ({reason})"))
        },
        ReconciliationOutcome::TransactionFailed { transaction_id } => {
            JsonResponse::success(format!("Transaction {transaction_id} marked as failed"))
        },
        ReconciliationOutcome::WithdrawalRecorded { withdrawal_id } => {
            JsonResponse::success(format!("Withdrawal {withdrawal_id} recorded"))
        },
        ReconciliationOutcome::Discarded(reason) => JsonResponse::failure(match reason {
            DiscardReason::LaggingDuplicate { transaction_id, credited_by } => {
                format!("Transaction {transaction_id} was already credited by the {credited_by} gateway")
            },
            DiscardReason::AlreadyProcessed { transaction_id } => {
                format!("Transaction {transaction_id} has already been processed")
            },
            DiscardReason::FailureIgnored { transaction_id } => {
                format!("Transaction {transaction_id} is no longer pending")
            },
            DiscardReason::UnknownTransaction => "Unknown transaction".to_string(),
            DiscardReason::AlreadyRecorded { external_ref } => format!("{external_ref} has already been recorded"),
            DiscardReason::NonPositiveAmount => "The transfer amount must be positive".to_string(),
        }),
    }
}
