//! Domain types shared across the service: provider regions, game version
//! variants, API namespaces and resource locations.

use serde::{Deserialize, Serialize};

/// Variant of the game a resource belongs to.
///
/// The provider serves each variant from its own namespace family, and the
/// disk cache keeps them in separate directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameVersion {
    Retail,
    Progression,
    ClassicEra,
}

impl GameVersion {
    /// Suffix spliced into namespace header values.
    pub fn namespace_suffix(self) -> &'static str {
        match self {
            Self::Retail => "",
            Self::Progression => "-classic",
            Self::ClassicEra => "-classic1x",
        }
    }

    /// Directory name used in the disk cache layout.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Retail => "retail",
            Self::Progression => "classic",
            Self::ClassicEra => "classic1x",
        }
    }
}

/// Namespace families exposed by the provider API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiNamespace {
    Static,
    Dynamic,
    Profile,
}

impl ApiNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Profile => "profile",
        }
    }

    /// URL path root: profile data lives under `/profile`, the rest under
    /// `/data`.
    pub fn path_root(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            _ => "data",
        }
    }
}

/// Where a resource lives: provider host, region and game variant.
///
/// The host is carried explicitly rather than derived from the region so
/// tests can point it at a local server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocation {
    pub host: String,
    pub region_code: String,
    pub version: GameVersion,
}

impl ResourceLocation {
    /// Namespace header value for this location, e.g. `dynamic-classic-eu`.
    pub fn namespace(&self, namespace: ApiNamespace) -> String {
        format!(
            "{}{}-{}",
            namespace.as_str(),
            self.version.namespace_suffix(),
            self.region_code
        )
    }
}

/// A provider region and its API gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub id: i64,
    pub name: &'static str,
    pub code: &'static str,
    pub host: &'static str,
}

impl Region {
    pub const NORTH_AMERICA: Region = Region {
        id: 0,
        name: "North America",
        code: "us",
        host: "https://us.api.blizzard.com",
    };
    pub const EUROPE: Region = Region {
        id: 1,
        name: "Europe",
        code: "eu",
        host: "https://eu.api.blizzard.com",
    };
    pub const SOUTH_KOREA: Region = Region {
        id: 2,
        name: "South Korea",
        code: "kr",
        host: "https://kr.api.blizzard.com",
    };
    pub const TAIWAN: Region = Region {
        id: 3,
        name: "Taiwan",
        code: "tw",
        host: "https://tw.api.blizzard.com",
    };
    // China is served from its own gateway rather than a regular subdomain.
    pub const CHINA: Region = Region {
        id: 4,
        name: "China",
        code: "cn",
        host: "https://gateway.battlenet.com.cn",
    };

    pub const ALL: [Region; 5] = [
        Self::NORTH_AMERICA,
        Self::EUROPE,
        Self::SOUTH_KOREA,
        Self::TAIWAN,
        Self::CHINA,
    ];

    pub fn by_code(code: &str) -> Option<Region> {
        Self::ALL.into_iter().find(|region| region.code == code)
    }

    /// Location of this region's resources for one game variant.
    pub fn location(&self, version: GameVersion) -> ResourceLocation {
        ResourceLocation {
            host: self.host.to_owned(),
            region_code: self.code.to_owned(),
            version,
        }
    }
}

/// Hypermedia link attached to API payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLink {
    pub href: String,
}
