//! The `tools/call`, `resources/read`, and `prompts/get` dispatch
//! procedures: resolve a public name to its owning upstream, acquire it,
//! substitute progress tokens, forward, and release.

use hatago_support::ids::ProgressTokenGenerator;
use hatago_support::HatagoError;
use hatago_registry::Registry;
use hatago_supervisor::{ActivationSource, Supervisor, UpstreamState};
use serde_json::{json, Value};

use crate::session::Session;
use crate::suggest;

pub struct Dispatcher<'a> {
    pub supervisor: &'a Supervisor,
    pub registry: &'a Registry,
    pub progress_tokens: &'a ProgressTokenGenerator,
}

impl<'a> Dispatcher<'a> {
    pub async fn call_tool(
        &self,
        session: &Session,
        public_name: &str,
        arguments: Value,
        progress_token: Option<Value>,
    ) -> Result<Value, HatagoError> {
        let Some((server_id, original_name)) = self.registry.resolve_public_tool(public_name).await
        else {
            let candidates = self.registry.list_tool_names().await;
            return Err(HatagoError::ToolNotFound {
                name: public_name.to_string(),
                suggestions: suggest::suggest(public_name, &candidates),
            });
        };

        let upstream = self
            .supervisor
            .get(&server_id)
            .await
            .ok_or_else(|| HatagoError::Internal(format!("registry points at unknown upstream '{server_id}'")))?;

        let actor = upstream.acquire(ActivationSource::ToolCall).await?;

        let mut params = json!({ "name": original_name, "arguments": arguments });
        let mut public_token = None;
        if let Some(token) = progress_token {
            let upstream_token = self.progress_tokens.next();
            hatago_support::rpc::set_progress_token(&mut params, json!(upstream_token));
            let token_str = token.as_str().map(str::to_string).unwrap_or_else(|| token.to_string());
            session
                .register_progress_token(token_str.clone(), server_id.clone(), upstream_token)
                .await;
            public_token = Some(token_str);
        }

        let result = actor.call("tools/call", params, upstream.config.request_timeout).await;
        upstream.release().await;

        if let Some(token) = public_token {
            session.unregister_progress_token(&token).await;
        }

        result
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Value, HatagoError> {
        let Some((server_id, owner_uri)) = self.registry.resolve_resource(uri).await else {
            return Err(HatagoError::Internal(format!("resource '{uri}' has no owning upstream")));
        };
        let upstream = self
            .supervisor
            .get(&server_id)
            .await
            .ok_or_else(|| HatagoError::Internal(format!("registry points at unknown upstream '{server_id}'")))?;
        let actor = upstream.acquire(ActivationSource::ToolCall).await?;
        let result = actor
            .call("resources/read", json!({ "uri": owner_uri }), upstream.config.request_timeout)
            .await;
        upstream.release().await;
        result
    }

    /// Fan out `resources/templates/list` to every `ACTIVE` upstream and
    /// union the results; upstreams that don't support it (or fail) are
    /// skipped silently.
    pub async fn list_resource_templates(&self) -> Result<Value, HatagoError> {
        let mut templates = Vec::new();
        for server_id in self.supervisor.server_ids().await {
            if self.supervisor.state_of(&server_id).await != Some(UpstreamState::Active) {
                continue;
            }
            let result = self
                .supervisor
                .call(&server_id, "resources/templates/list", json!({}), ActivationSource::ToolCall)
                .await;
            if let Ok(result) = result {
                if let Some(arr) = result.get("resourceTemplates").and_then(Value::as_array) {
                    templates.extend(arr.iter().cloned());
                }
            }
        }
        Ok(json!({ "resourceTemplates": templates }))
    }

    pub async fn get_prompt(&self, public_name: &str, arguments: Value) -> Result<Value, HatagoError> {
        let Some((server_id, original_name)) = self.registry.resolve_public_prompt(public_name).await
        else {
            let candidates = self.registry.list_prompts().await.into_iter().map(|p| p.public_name).collect::<Vec<_>>();
            return Err(HatagoError::ToolNotFound {
                name: public_name.to_string(),
                suggestions: suggest::suggest(public_name, &candidates),
            });
        };
        let upstream = self
            .supervisor
            .get(&server_id)
            .await
            .ok_or_else(|| HatagoError::Internal(format!("registry points at unknown upstream '{server_id}'")))?;
        let actor = upstream.acquire(ActivationSource::ToolCall).await?;
        let result = actor
            .call("prompts/get", json!({ "name": original_name, "arguments": arguments }), upstream.config.request_timeout)
            .await;
        upstream.release().await;
        result
    }
}
