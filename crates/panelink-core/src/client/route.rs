use crate::error::RouteError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a panel server (UUID or short identifier).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Result<Self, RouteError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(RouteError::EmptyIdentifier);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ServerId {
    type Error = RouteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerId> for String {
    fn from(id: ServerId) -> Self {
        id.0
    }
}

/// Sub-pages of a server view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerSection {
    #[default]
    Console,
    Files,
    Subusers,
    Schedules,
    Databases,
    Allocations,
    Settings,
}

impl ServerSection {
    pub fn all_variants() -> &'static [ServerSection] {
        &[
            ServerSection::Console,
            ServerSection::Files,
            ServerSection::Subusers,
            ServerSection::Schedules,
            ServerSection::Databases,
            ServerSection::Allocations,
            ServerSection::Settings,
        ]
    }

    pub fn slug(self) -> &'static str {
        match self {
            ServerSection::Console => "console",
            ServerSection::Files => "files",
            ServerSection::Subusers => "subusers",
            ServerSection::Schedules => "schedules",
            ServerSection::Databases => "databases",
            ServerSection::Allocations => "allocations",
            ServerSection::Settings => "settings",
        }
    }

    fn from_slug(slug: &str) -> Option<Self> {
        Self::all_variants()
            .iter()
            .copied()
            .find(|section| section.slug() == slug)
    }
}

/// A navigation target inside a server view: `/server/{id}[/{section}[/...]]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerRoute {
    pub server_id: ServerId,
    pub section: ServerSection,
}

impl ServerRoute {
    /// Parse a panel path. Returns `None` for paths outside a server view.
    ///
    /// Any prefix before the `server` segment (e.g. a panel mounted under
    /// `/panel`) and any query string or fragment are ignored. Unknown
    /// section names fall back to the console.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        segments.by_ref().find(|s| *s == "server")?;
        let server_id = ServerId::new(segments.next()?).ok()?;
        let section = segments
            .next()
            .and_then(ServerSection::from_slug)
            .unwrap_or_default();

        Some(Self { server_id, section })
    }

    #[cfg(test)]
    pub fn path(&self) -> String {
        match self.section {
            ServerSection::Console => format!("/server/{}", self.server_id),
            section => format!("/server/{}/{}", self.server_id, section.slug()),
        }
    }
}
