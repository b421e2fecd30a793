#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum TaxonomyError {
    #[error("taxonomy is missing a reference to '{0}'")]
    Incomplete(String),

    #[error("link role '{0}' contains a cycle in its concept arcs")]
    Cyclic(String),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("two link roles compiled to the same table name: '{0}'")]
    Conflict(String),

    #[error("leaf concept '{0}' has no declared period type")]
    MissingPeriodType(String),
}

#[derive(thiserror::Error, Debug)]
pub enum InstanceError {
    #[error("context '{0}' is malformed: {1}")]
    ContextMalformed(String, String),

    #[error("failed to parse fact value for concept '{0}': {1}")]
    FactParse(String, String),

    #[error("filing '{0}' exceeded its wall-clock timeout")]
    Timeout(String),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to write table '{0}': {1}")]
    Write(String, String),

    #[error("no sink configured: at least one of sqlite_path/duckdb_path must be set")]
    NoneConfigured,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
