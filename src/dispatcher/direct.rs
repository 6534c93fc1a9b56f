//! Single mapping and tag pass-throughs.
//!
//! These bypass the job engine: one document, one transport call, and the
//! first transport error goes straight back to the caller.

use crate::error::{Error, Result};
use crate::protocol;
use crate::transport::ConnectionTarget;
use crate::types::{AgentResponse, Entry, SingleMappingRequest, TagRequest, UidMessage};
use std::net::IpAddr;

use super::Dispatcher;

impl Dispatcher {
    /// Send one binding and wait for the Agent's answer
    pub async fn send_single(&self, request: SingleMappingRequest) -> Result<AgentResponse> {
        let ip: IpAddr = request
            .ip
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("invalid ip {:?}", request.ip)))?;
        if request.username.trim().is_empty() {
            return Err(Error::Validation("username must not be empty".into()));
        }
        let target = self.resolve_target(request.endpoint, request.cert_bundle)?;

        tracing::info!(
            ip = %ip,
            username = %request.username,
            operation = %request.operation,
            "sending single mapping"
        );

        let message = UidMessage::Bindings {
            action: request.operation,
            entries: vec![Entry::new(request.username, ip, request.timeout)],
        };
        self.deliver(&message, &target).await
    }

    /// Send a tag list as one document
    ///
    /// Address-tag subjects must parse as IP addresses. An empty list is rejected.
    pub async fn send_tags(&self, request: TagRequest) -> Result<AgentResponse> {
        if request.items.is_empty() {
            return Err(Error::Validation("items must not be empty".into()));
        }
        for item in &request.items {
            if item.subject.trim().is_empty() {
                return Err(Error::Validation("tag subject must not be empty".into()));
            }
            if item.tag.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "tag label for {:?} must not be empty",
                    item.subject
                )));
            }
            if !request.action.targets_users() && item.subject.trim().parse::<IpAddr>().is_err() {
                return Err(Error::Validation(format!(
                    "{:?} is not an IP address",
                    item.subject
                )));
            }
        }
        let target = self.resolve_target(request.endpoint, request.cert_bundle)?;

        tracing::info!(
            action = %request.action,
            count = request.items.len(),
            "sending tag update"
        );

        let message = UidMessage::Tags {
            action: request.action,
            entries: request.items,
        };
        self.deliver(&message, &target).await
    }

    async fn deliver(
        &self,
        message: &UidMessage,
        target: &ConnectionTarget,
    ) -> Result<AgentResponse> {
        let document = protocol::encode(message);
        self.transport
            .send(&document, target)
            .await
            .map_err(|e| {
                tracing::error!(
                    endpoint = %target.endpoint,
                    action = message.action_name(),
                    error = %e,
                    "delivery failed"
                );
                Error::Transport(e)
            })
    }
}
