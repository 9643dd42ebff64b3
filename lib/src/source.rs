use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One external data provider probed during an investigation.
///
/// The set is closed: each source gets its own worker, queue bands and
/// circuit breaker, all keyed by the serialized name below.
#[derive(
    PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Deserialize, Serialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Cadastro Ambiental Rural
    Car,
    /// INCRA / SNCR rural property registry
    Incra,
    /// Receita Federal (CPF/CNPJ lookups)
    Receita,
    /// Official gazettes
    DiarioOficial,
    /// Notary registries
    Cartorios,
    /// SIGEF + SICAR georeferenced parcels
    SigefSicar,
}

impl Source {
    /// Every source, in dispatch order.
    pub fn all() -> [Source; 6] {
        [
            Source::Car,
            Source::Incra,
            Source::Receita,
            Source::DiarioOficial,
            Source::Cartorios,
            Source::SigefSicar,
        ]
    }

    /// The stable name used in storage keys and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Car => "car",
            Source::Incra => "incra",
            Source::Receita => "receita",
            Source::DiarioOficial => "diario_oficial",
            Source::Cartorios => "cartorios",
            Source::SigefSicar => "sigef_sicar",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "car" => Ok(Source::Car),
            "incra" => Ok(Source::Incra),
            "receita" => Ok(Source::Receita),
            "diario_oficial" => Ok(Source::DiarioOficial),
            "cartorios" => Ok(Source::Cartorios),
            "sigef_sicar" => Ok(Source::SigefSicar),
            _ => Err(format!("unsupported source: {s}")),
        }
    }
}
