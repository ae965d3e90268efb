//! # Request Handler
//!
//! The server half of a node. Each inbound request runs through
//!
//! `Parse → ExtractServiceAddress → Resolve → (Acknowledge) → Invoke → Respond`
//!
//! and every failure along the way ends in an optional, policy-gated error
//! reply. Nothing here ever fails outward: a datagram either earns a reply or
//! it does not.
//!
//! ## Addressing
//!
//! If a translator is configured and the first payload byte translates, that
//! byte is the whole address. Otherwise the address runs up to the first `?`.

use std::sync::Arc;

use coapwire::Message;
use coapwire::PacketType;
use coapwire::ResponseCode;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::config::Config;
use crate::policy;
use crate::policy::Policy;
use crate::policy::SERVICE_TERMINATOR;
use crate::service::ServiceProvider;
use crate::translator::UrnTranslator;
use crate::transport::Hex;
use crate::transport::MessageDispatcher;
use crate::transport::SocketConnector;
use crate::urn::ServiceUrn;
use crate::urn::UrnError;

/// Turns inbound requests into calls on local services.
pub struct RequestHandler {
    provider: Arc<dyn ServiceProvider>,
    connector: Option<Arc<dyn SocketConnector>>,
    translator: Option<Arc<dyn UrnTranslator>>,
    policy: Policy,
}

impl RequestHandler {
    pub fn new(provider: Arc<dyn ServiceProvider>, config: &Config) -> Self {
        Self {
            provider,
            connector: None,
            translator: None,
            policy: config.policy,
        }
    }

    /// Connector used to send eager acknowledgements.
    pub fn with_connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn UrnTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    fn translated(&self, payload: &[u8]) -> Option<ServiceUrn> {
        let first = *payload.first()?;
        self.translator.as_ref()?.byte_to_urn(first)
    }

    /// Extracts the service identifier a request payload is addressed to.
    pub fn urn_from_payload(&self, payload: &[u8]) -> Result<ServiceUrn, UrnError> {
        if let Some(urn) = self.translated(payload) {
            return Ok(urn);
        }

        let end = payload
            .iter()
            .position(|&b| b == SERVICE_TERMINATOR)
            .unwrap_or(payload.len());
        ServiceUrn::from_bytes(&payload[..end])
    }

    /// Extracts the arguments following the service address, if any remain.
    pub fn arguments_from_payload(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let args = if self.translated(payload).is_some() {
            &payload[1..]
        } else {
            let at = payload.iter().position(|&b| b == SERVICE_TERMINATOR)?;
            &payload[at + 1..]
        };

        if args.is_empty() { None } else { Some(args.to_vec()) }
    }

    /// Runs one request through the pipeline and returns the reply, if any.
    ///
    /// Messages that are not requests are ignored.
    pub async fn handle_request(&self, request: &Message) -> Option<Message> {
        let method = request.method()?;
        let id = request.message_id;

        let urn = match self.urn_from_payload(&request.payload) {
            Ok(urn) => urn,
            Err(e) => {
                warn!(message_id = id, error = %e, "malformed service address in coap request");
                return self.policy.create_error(request, ResponseCode::BadRequest);
            }
        };

        let Some(service) = self.provider.resolve(&urn) else {
            warn!(message_id = id, %urn, "coap request for unknown service");
            return self.policy.create_error(request, ResponseCode::NotFound);
        };

        self.acknowledge(request).await;

        let args = self.arguments_from_payload(&request.payload);
        match service.call(method, args.as_deref()).await {
            Ok(None) => None,
            Ok(Some(result)) => Some(
                Message::response(PacketType::Non, ResponseCode::Content, id)
                    .with_token(request.token.clone())
                    .with_payload(result),
            ),
            Err(e) => {
                error!(message_id = id, %urn, ?method, error = %e, "coap service invocation failed");
                self.policy.create_error(request, ResponseCode::BadOption)
            }
        }
    }

    /// Sends a standalone ACK ahead of invocation, when policy and connector allow.
    async fn acknowledge(&self, request: &Message) {
        let Some(connector) = &self.connector else {
            return;
        };
        let Some(ack) = self.policy.create_ack(request) else {
            return;
        };
        let Some(bytes) = policy::encode_reply(&ack) else {
            return;
        };

        if let Err(e) = connector.write(&bytes).await {
            warn!(message_id = request.message_id, error = %e, "failed to send coap ack");
        }
    }
}

#[async_trait::async_trait]
impl MessageDispatcher for RequestHandler {
    async fn dispatch_message(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let message = match Message::parse(bytes) {
            Ok(message) => message,
            Err(e @ coapwire::Error::UnknownMethod(_)) => {
                error!(error = %e, "coap request with unrecognized method");
                return None;
            }
            Err(e) => {
                trace!(error = %e, "received bytes cannot be parsed as coap message");
                return None;
            }
        };

        if !message.is_request() {
            return None;
        }

        trace!(
            message_id = message.message_id,
            code = ?message.code,
            payload = %Hex(&message.payload),
            "received coap request"
        );

        let reply = self.handle_request(&message).await?;
        policy::encode_reply(&reply)
    }
}
