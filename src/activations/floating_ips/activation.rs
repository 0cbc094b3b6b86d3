use super::backend::{BackendError, NetworkBackend};
use super::types::{
    AssociateForm, FloatingIpError, FloatingIpEvent, Message, TableAction, FLOATING_IPS_TABLE,
};
use crate::types::ResourceId;
use async_stream::stream;
use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Floating IP panel: associate and disassociate public addresses
pub struct FloatingIps<B> {
    backend: Arc<B>,
    index_url: Arc<str>,
}

impl<B> Clone for FloatingIps<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            index_url: self.index_url.clone(),
        }
    }
}

impl<B: NetworkBackend> FloatingIps<B> {
    pub fn new(backend: Arc<B>, index_url: impl Into<String>) -> Self {
        Self {
            backend,
            index_url: Arc::from(index_url.into()),
        }
    }

    pub fn backend(&self) -> Arc<B> {
        self.backend.clone()
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    /// Addresses and targets offered by the associate form
    ///
    /// Addresses already attached to something are left out.
    pub fn associate_choices(&self) -> impl Stream<Item = FloatingIpEvent> + Send + 'static {
        let backend = self.backend.clone();
        let index_url = self.index_url.clone();
        stream! {
            let ips = match backend.tenant_floating_ip_list().await {
                Ok(ips) => ips,
                Err(e) => {
                    warn!(error = %e, "ASSOCIATE: unable to list floating IPs");
                    for event in failure(e.into(), "Unable to retrieve floating IP addresses.", &index_url) {
                        yield event;
                    }
                    return;
                }
            };
            let targets = match backend.floating_ip_target_list().await {
                Ok(targets) => targets,
                Err(e) => {
                    warn!(error = %e, "ASSOCIATE: unable to list targets");
                    for event in failure(e.into(), "Unable to retrieve instance list.", &index_url) {
                        yield event;
                    }
                    return;
                }
            };

            let ips: Vec<_> = ips.into_iter().filter(|fip| !fip.is_associated()).collect();
            debug!(ips = ips.len(), targets = targets.len(), "ASSOCIATE: choices loaded");
            yield FloatingIpEvent::Choices { ips, targets };
        }
    }

    /// Attach the posted `ip_id` to the posted `instance_id`
    ///
    /// Invalid input re-displays the form: an error and a message, no
    /// redirect. Backend failures send the caller back to the index.
    pub fn associate(
        &self,
        fields: HashMap<String, String>,
        next: Option<String>,
    ) -> impl Stream<Item = FloatingIpEvent> + Send + 'static {
        let backend = self.backend.clone();
        let index_url = self.index_url.clone();
        stream! {
            let form = match AssociateForm::from_fields(&fields) {
                Ok(form) => form,
                Err(e) => {
                    debug!(error = %e, "ASSOCIATE: form rejected");
                    yield FloatingIpEvent::from_error(&e);
                    yield FloatingIpEvent::Message(Message::error(e.to_string()));
                    return;
                }
            };

            // Choices are rebuilt for validation, as the rendered form did.
            let loaded = async {
                let ips = backend.tenant_floating_ip_list().await?;
                let targets = backend.floating_ip_target_list().await?;
                Ok::<_, FloatingIpError>((ips, targets))
            };
            let (ips, targets) = match loaded.await {
                Ok(lists) => lists,
                Err(e) => {
                    warn!(error = %e, "ASSOCIATE: unable to load choices");
                    for event in failure(e, "Unable to associate floating IP.", &index_url) {
                        yield event;
                    }
                    return;
                }
            };

            // Posted IDs may differ from the stored ones in padding or UUID
            // case; from here on only the stored IDs are used.
            let chosen_ip = ips
                .iter()
                .find(|fip| fip.id.matches(&form.ip_id) && !fip.is_associated());
            let chosen_target = targets.iter().find(|t| t.id.matches(&form.instance_id));
            let (ip_id, target_id, address) = match (chosen_ip, chosen_target) {
                (Some(fip), Some(target)) => (fip.id.clone(), target.id.clone(), fip.ip.clone()),
                _ => {
                    let id = if chosen_ip.is_none() { form.ip_id } else { form.instance_id };
                    let e = FloatingIpError::InvalidChoice(id);
                    debug!(error = %e, "ASSOCIATE: form rejected");
                    yield FloatingIpEvent::from_error(&e);
                    yield FloatingIpEvent::Message(Message::error(e.to_string()));
                    return;
                }
            };

            match backend.floating_ip_associate(&ip_id, &target_id).await {
                Ok(()) => {
                    info!(ip_id = %ip_id, target_id = %target_id, "ASSOCIATE: done");
                    yield FloatingIpEvent::Associated { ip_id, target_id };
                    yield FloatingIpEvent::Message(Message::success(format!(
                        "Successfully associated floating IP: {}",
                        address
                    )));
                    yield FloatingIpEvent::redirect(redirect_target(next.as_deref(), &index_url));
                }
                Err(e) => {
                    warn!(error = %e, ip_id = %ip_id, "ASSOCIATE: backend call failed");
                    for event in failure(e.into(), "Unable to associate floating IP.", &index_url) {
                        yield event;
                    }
                }
            }
        }
    }

    /// Decode an urlencoded form post and its query string, then associate
    pub fn associate_request(
        &self,
        query: &str,
        body: &str,
    ) -> impl Stream<Item = FloatingIpEvent> + Send + 'static {
        let fields: HashMap<String, String> = form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect();
        let next = form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .find(|(key, _)| key == "next")
            .map(|(_, value)| value.into_owned());
        self.associate(fields, next)
    }

    /// Handle a `floating_ips__disassociate__<id>` table row action
    pub fn disassociate(&self, action: String) -> impl Stream<Item = FloatingIpEvent> + Send + 'static {
        let backend = self.backend.clone();
        let index_url = self.index_url.clone();
        stream! {
            let object_id = match parse_disassociate(&action) {
                Ok(id) => id,
                Err(e) => {
                    debug!(action = %action, error = %e, "DISASSOCIATE: action rejected");
                    yield FloatingIpEvent::from_error(&e);
                    return;
                }
            };

            // Table data: servers for the instance column, then the addresses.
            let loaded = async {
                let (servers, _has_more) = backend.server_list(true).await?;
                let ips = backend.tenant_floating_ip_list().await?;
                Ok::<_, FloatingIpError>((servers, ips))
            };
            let (servers, ips) = match loaded.await {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "DISASSOCIATE: unable to load table data");
                    for event in failure(e, "Unable to disassociate floating IP.", &index_url) {
                        yield event;
                    }
                    return;
                }
            };

            let Some(fip) = ips.into_iter().find(|fip| fip.id.matches(&object_id)) else {
                let e = FloatingIpError::Backend(BackendError::FloatingIpNotFound(object_id));
                for event in failure(e, "Unable to disassociate floating IP.", &index_url) {
                    yield event;
                }
                return;
            };
            let Some(instance_id) = fip.instance_id.clone() else {
                let e = FloatingIpError::NotAssociated(fip.id);
                for event in failure(e, "Unable to disassociate floating IP.", &index_url) {
                    yield event;
                }
                return;
            };

            match backend.floating_ip_disassociate(&fip.id, &instance_id).await {
                Ok(()) => {
                    let server = servers
                        .iter()
                        .find(|s| s.id.matches(&instance_id))
                        .map(|s| s.name.as_str())
                        .unwrap_or("unknown instance");
                    info!(ip_id = %fip.id, instance_id = %instance_id, server, "DISASSOCIATE: done");
                    yield FloatingIpEvent::Disassociated {
                        ip_id: fip.id.clone(),
                        instance_id,
                    };
                    yield FloatingIpEvent::Message(Message::success(format!(
                        "Successfully disassociated floating IP: {}",
                        fip.ip
                    )));
                    yield FloatingIpEvent::redirect(index_url.to_string());
                }
                Err(e) => {
                    warn!(error = %e, ip_id = %fip.id, "DISASSOCIATE: backend call failed");
                    for event in failure(e.into(), "Unable to disassociate floating IP.", &index_url) {
                        yield event;
                    }
                }
            }
        }
    }
}

fn parse_disassociate(raw: &str) -> Result<ResourceId, FloatingIpError> {
    let action = TableAction::parse(raw)?;
    if action.table != FLOATING_IPS_TABLE || action.action != "disassociate" {
        return Err(FloatingIpError::InvalidAction(raw.to_string()));
    }
    Ok(action.object_id)
}

/// Events for a failed backend step: error, user message, back to the index
fn failure(err: FloatingIpError, text: &str, index_url: &str) -> [FloatingIpEvent; 3] {
    [
        FloatingIpEvent::from_error(&err),
        FloatingIpEvent::Message(Message::error(text)),
        FloatingIpEvent::redirect(index_url),
    ]
}

/// Only same-site relative paths are honoured as `next`
fn redirect_target(next: Option<&str>, index_url: &str) -> String {
    match next {
        Some(url) if is_same_site_path(url) => url.to_string(),
        Some(url) => {
            debug!(next = url, "ASSOCIATE: ignoring non-relative redirect");
            index_url.to_string()
        }
        None => index_url.to_string(),
    }
}

// Browsers read `\` as `/` and drop tabs and newlines, so `/\host` and
// `/\t/host` both resolve to `//host`.
fn is_same_site_path(url: &str) -> bool {
    let mut chars = url.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/' | '\\'))
        && !url.chars().any(|c| c.is_ascii_control())
}
