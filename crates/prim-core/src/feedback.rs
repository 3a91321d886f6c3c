//! Terminal response stage: every response leaves with an `X-Feedback-Url` header,
//! and JSON error bodies additionally carry a `feedback_url` key.

use actix_web::body::{self, BoxBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use actix_web::error::InternalError;
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpResponse, ResponseError};
use bytes::Bytes;

use crate::error::{ApiError, ErrorEnvelope};
use crate::metrics::ERROR_BODIES_AUGMENTED;

pub const FEEDBACK_HEADER: &str = "x-feedback-url";
pub const DEFAULT_FEEDBACK_URL: &str = "https://feedback.prim.sh/v1/submit";

/// Where clients report problems. Registered as app data.
#[derive(Debug, Clone)]
pub struct FeedbackChannel {
    url: String,
    header_value: HeaderValue,
}

impl FeedbackChannel {
    pub fn new(url: &str) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            url: url.to_string(),
            header_value: HeaderValue::from_str(url)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for FeedbackChannel {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEEDBACK_URL.to_string(),
            header_value: HeaderValue::from_static(DEFAULT_FEEDBACK_URL),
        }
    }
}

/// Middleware for `actix_web::middleware::from_fn`. Wrap it outermost so it also
/// sees responses produced by earlier short-circuits and by routing (404s).
pub async fn augment_response(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let channel = req
        .app_data::<web::Data<FeedbackChannel>>()
        .map(|c| c.get_ref().clone())
        .unwrap_or_default();

    // Routing needs sole ownership of the request: no clone may outlive this call.
    let res = match next.call(req).await {
        Ok(res) => res.map_into_boxed_body(),
        Err(err) => {
            // No request left to build a ServiceResponse; the server renders this one.
            let response = finish(err.error_response(), &channel).await;
            return Err(InternalError::from_response(err, response).into());
        }
    };

    let (http_req, response) = res.into_parts();
    let response = finish(response, &channel).await;
    Ok(ServiceResponse::new(http_req, response))
}

async fn finish(
    response: HttpResponse<BoxBody>,
    channel: &FeedbackChannel,
) -> HttpResponse<BoxBody> {
    let mut response = shape_body(response, channel).await;
    response.headers_mut().insert(
        HeaderName::from_static(FEEDBACK_HEADER),
        channel.header_value.clone(),
    );
    response
}

/// Merge `feedback_url` into error bodies; everything else is returned untouched.
async fn shape_body(
    response: HttpResponse<BoxBody>,
    channel: &FeedbackChannel,
) -> HttpResponse<BoxBody> {
    if !(response.status().is_client_error() || response.status().is_server_error()) {
        return response;
    }

    // Taxonomy errors are re-rendered from their envelope, no body parsing needed.
    let envelope = response.extensions().get::<ErrorEnvelope>().cloned();
    if let Some(envelope) = envelope {
        return render_envelope(response, &envelope, channel);
    }

    if !is_json(response.headers()) {
        return response;
    }

    // Read the body exactly once; the pass-through path re-emits these bytes.
    let (head, original) = response.into_parts();
    let bytes = match body::to_bytes(original).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let fault = ApiError::unknown(format!("reading error body: {}", e));
            return render_envelope(fault.error_response(), fault.envelope(), channel);
        }
    };

    let body = match merge_feedback_url(&bytes, channel.url()) {
        Some(merged) => {
            ERROR_BODIES_AUGMENTED.inc();
            merged
        }
        None => bytes,
    };
    head.set_body(BoxBody::new(body))
}

fn render_envelope(
    response: HttpResponse<BoxBody>,
    envelope: &ErrorEnvelope,
    channel: &FeedbackChannel,
) -> HttpResponse<BoxBody> {
    let (head, _original) = response.into_parts();
    let body = envelope.to_body(Some(channel.url())).to_string();
    ERROR_BODIES_AUGMENTED.inc();
    head.set_body(BoxBody::new(body))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// `Some(new body)` if `body` is a JSON object with an `error` key, else `None`.
pub fn merge_feedback_url(body: &[u8], feedback_url: &str) -> Option<Bytes> {
    let mut value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object_mut()?;
    if !object.contains_key("error") {
        return None;
    }
    object.insert(
        "feedback_url".to_string(),
        serde_json::Value::String(feedback_url.to_string()),
    );
    serde_json::to_vec(&value).ok().map(Bytes::from)
}
