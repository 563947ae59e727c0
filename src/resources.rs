//! Resource kind names and their REST and event path mappings.
//!
//! Platform-defined kinds carry a `system.` prefix. Any other kind is a
//! user-defined type and lives under `custom/`.

use crate::error::{Result, VantiqError};

pub const SYSTEM_PREFIX: &str = "system.";

pub const DOCUMENTS: &str = "system.documents";
pub const K8S_CLUSTERS: &str = "system.k8sclusters";
pub const NAMESPACES: &str = "system.namespaces";
pub const PROCEDURES: &str = "system.procedures";
pub const RULES: &str = "system.rules";
pub const SERVICES: &str = "system.services";
pub const SOURCES: &str = "system.sources";
pub const TOPICS: &str = "system.topics";
pub const TYPES: &str = "system.types";
pub const USERS: &str = "system.users";

pub fn is_system(kind: &str) -> bool {
    kind.starts_with(SYSTEM_PREFIX)
}

/// `system.types` → `types`; user-defined kinds are returned unchanged.
pub fn unqualified_name(kind: &str) -> &str {
    kind.strip_prefix(SYSTEM_PREFIX).unwrap_or(kind)
}

/// Path segment(s) under `resources/` for a kind.
pub fn resource_path(kind: &str) -> String {
    match kind.strip_prefix(SYSTEM_PREFIX) {
        Some(name) => urlencoding::encode(name).into_owned(),
        None => format!("custom/{}", urlencoding::encode(kind)),
    }
}

/// `<resource path>/<id>`, each `/`-separated part of the id encoded on
/// its own so hierarchical names (documents, topics) keep their slashes.
pub fn instance_path(kind: &str, id: &str) -> String {
    format!("{}/{}", resource_path(kind), encode_segments(id))
}

pub(crate) fn encode_segments(id: &str) -> String {
    id.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Kinds that publish event streams a session can subscribe to.
pub fn is_subscribable(kind: &str) -> bool {
    matches!(kind, TOPICS | TYPES | SERVICES | SOURCES)
}

/// Event stream path for a subscription, also used as its request id.
///
/// - topics: `/topics<topic>`
/// - types: `/types/<type>/<operation>`, or `/types/<type>` for all operations
/// - services: `/services/<service>/<event>`
/// - sources: `/sources/<source>`
pub fn event_path(kind: &str, id: &str, operation: Option<&str>) -> Result<String> {
    let id = id.trim_start_matches('/');
    if id.is_empty() {
        return Err(VantiqError::ValidationError(format!(
            "A resource id is required to subscribe to {}",
            kind
        )));
    }

    let path = match kind {
        TOPICS => format!("/topics/{}", id),
        TYPES => match operation {
            Some(op) => format!("/types/{}/{}", id, op),
            None => format!("/types/{}", id),
        },
        SERVICES => match operation {
            Some(event) => format!("/services/{}/{}", id, event),
            None => format!("/services/{}", id),
        },
        SOURCES => format!("/sources/{}", id),
        other => {
            return Err(VantiqError::ValidationError(format!(
                "Subscriptions are only supported for topics, types, services and sources, not '{}'",
                other
            )))
        },
    };
    Ok(path)
}
