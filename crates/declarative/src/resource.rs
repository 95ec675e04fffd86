//! Resource model - typed, validated declarations of desired host state
//!
//! A declaration names a [`ResourceKind`], an identifier, a bag of desired
//! attributes and the actions to run. Every kind carries a static schema
//! describing which attribute keys it accepts, the type of each value, and
//! which keys a given action cannot do without. Declarations can only be
//! built through validation, so anything the engine receives already
//! conforms to its kind's schema.

use crate::error::{Error, Result, SchemaProblem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Kinds and Actions
// ============================================================================

/// Closed set of resource types the engine knows how to converge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Service,
    Directory,
    File,
    RegistryKey,
    Site,
    ApplicationPool,
    InstallableProduct,
}

impl ResourceKind {
    pub const ALL: [Self; 7] = [
        Self::Service,
        Self::Directory,
        Self::File,
        Self::RegistryKey,
        Self::Site,
        Self::ApplicationPool,
        Self::InstallableProduct,
    ];

    /// Wire name of this kind (e.g. "application_pool")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Directory => "directory",
            Self::File => "file",
            Self::RegistryKey => "registry_key",
            Self::Site => "site",
            Self::ApplicationPool => "application_pool",
            Self::InstallableProduct => "installable_product",
        }
    }

    /// Actions this kind supports, in their conventional order
    pub fn actions(&self) -> &'static [Action] {
        match self {
            Self::Service => &[Action::Enable, Action::Start, Action::Stop, Action::Disable],
            Self::Directory | Self::File => &[Action::Create],
            Self::RegistryKey => &[Action::Create, Action::Delete],
            Self::Site => &[Action::Add, Action::Start, Action::Stop],
            Self::ApplicationPool => &[Action::Add],
            Self::InstallableProduct => &[Action::Install],
        }
    }

    /// Action used when a declaration does not request any
    ///
    /// Services have no default: enabling or starting something must be asked for.
    pub fn default_action(&self) -> Option<Action> {
        match self {
            Self::Service => None,
            _ => self.actions().first().copied(),
        }
    }

    /// Whether this kind supports the given action
    pub fn allows(&self, action: Action) -> bool {
        self.actions().contains(&action)
    }

    /// Attribute schema for this kind
    pub fn schema(&self) -> &'static [AttrSpec] {
        match self {
            Self::Service => SERVICE_SCHEMA,
            Self::Directory => DIRECTORY_SCHEMA,
            Self::File => FILE_SCHEMA,
            Self::RegistryKey => REGISTRY_KEY_SCHEMA,
            Self::Site => SITE_SCHEMA,
            Self::ApplicationPool => APPLICATION_POOL_SCHEMA,
            Self::InstallableProduct => INSTALLABLE_PRODUCT_SCHEMA,
        }
    }

    /// Kinds whose name is a filesystem path
    pub fn is_path(&self) -> bool {
        matches!(self, Self::Directory | Self::File)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// An action that can be requested on a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Enable,
    Start,
    Stop,
    Disable,
    Create,
    Delete,
    Add,
    Install,
}

impl Action {
    pub const ALL: [Self; 8] = [
        Self::Enable,
        Self::Start,
        Self::Stop,
        Self::Disable,
        Self::Create,
        Self::Delete,
        Self::Add,
        Self::Install,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Disable => "disable",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Add => "add",
            Self::Install => "install",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::UnknownAction(s.to_string()))
    }
}

// ============================================================================
// Attribute Values
// ============================================================================

/// An attribute value, desired or observed
///
/// Floats are accepted by the parser so schema checks can name the offending
/// key; no attribute takes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Attribute bag keyed by attribute name
pub type Attributes = BTreeMap<String, Value>;

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short type name used in schema messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "table",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k} = {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

// ============================================================================
// Schemas
// ============================================================================

/// Expected shape of an attribute value
#[derive(Debug, Clone, Copy)]
pub enum ValueType {
    Bool,
    Str,
    /// TCP port, 1..=65535
    Port,
    /// String restricted to a fixed set
    OneOf(&'static [&'static str]),
    /// List of `{name, type, data}` registry values
    RegistryValues,
}

/// Schema entry for one attribute key
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub key: &'static str,
    pub value_type: ValueType,
    /// Actions that cannot run without this key
    pub required_for: &'static [Action],
}

impl AttrSpec {
    const fn optional(key: &'static str, value_type: ValueType) -> Self {
        Self {
            key,
            value_type,
            required_for: &[],
        }
    }

    const fn required(
        key: &'static str,
        value_type: ValueType,
        actions: &'static [Action],
    ) -> Self {
        Self {
            key,
            value_type,
            required_for: actions,
        }
    }
}

pub const RUNTIME_VERSIONS: &[&str] = &["", "2.0", "4.0"];
pub const PIPELINE_MODES: &[&str] = &["Integrated", "Classic"];
pub const POOL_IDENTITIES: &[&str] = &[
    "LocalSystem",
    "LocalService",
    "NetworkService",
    "SpecificUser",
    "ApplicationPoolIdentity",
];
pub const START_MODES: &[&str] = &["OnDemand", "AlwaysRunning"];
pub const PROTOCOLS: &[&str] = &["http", "https"];
pub const REGISTRY_VALUE_TYPES: &[&str] = &[
    "string",
    "expand_string",
    "multi_string",
    "dword",
    "qword",
    "binary",
];
pub const REGISTRY_HIVES: &[&str] = &[
    "HKEY_LOCAL_MACHINE",
    "HKLM",
    "HKEY_CURRENT_USER",
    "HKCU",
    "HKEY_CLASSES_ROOT",
    "HKCR",
    "HKEY_USERS",
    "HKU",
    "HKEY_CURRENT_CONFIG",
    "HKCC",
];

const SERVICE_SCHEMA: &[AttrSpec] = &[];

const DIRECTORY_SCHEMA: &[AttrSpec] = &[AttrSpec::optional("recursive", ValueType::Bool)];

const FILE_SCHEMA: &[AttrSpec] = &[AttrSpec::required(
    "content",
    ValueType::Str,
    &[Action::Create],
)];

const REGISTRY_KEY_SCHEMA: &[AttrSpec] = &[
    AttrSpec::required("values", ValueType::RegistryValues, &[Action::Create]),
    AttrSpec::optional("recursive", ValueType::Bool),
];

const SITE_SCHEMA: &[AttrSpec] = &[
    AttrSpec::optional("protocol", ValueType::OneOf(PROTOCOLS)),
    AttrSpec::required("port", ValueType::Port, &[Action::Add]),
    AttrSpec::required("path", ValueType::Str, &[Action::Add]),
    AttrSpec::optional("application_pool", ValueType::Str),
    AttrSpec::optional("host_header", ValueType::Str),
];

const APPLICATION_POOL_SCHEMA: &[AttrSpec] = &[
    AttrSpec::optional("runtime_version", ValueType::OneOf(RUNTIME_VERSIONS)),
    AttrSpec::optional("pipeline_mode", ValueType::OneOf(PIPELINE_MODES)),
    AttrSpec::optional("pool_identity", ValueType::OneOf(POOL_IDENTITIES)),
    AttrSpec::optional("start_mode", ValueType::OneOf(START_MODES)),
    AttrSpec::optional("auto_start", ValueType::Bool),
    AttrSpec::optional("load_user_profile", ValueType::Bool),
];

const INSTALLABLE_PRODUCT_SCHEMA: &[AttrSpec] = &[
    AttrSpec::optional("version", ValueType::Str),
    AttrSpec::optional("accept_eula", ValueType::Bool),
];

fn check_value(key: &str, value: &Value, value_type: ValueType, problems: &mut Vec<SchemaProblem>) {
    match value_type {
        ValueType::Bool if value.as_bool().is_none() => problems.push(SchemaProblem::key(
            key,
            format!("expected boolean, got {}", value.type_name()),
        )),
        ValueType::Str if value.as_str().is_none() => problems.push(SchemaProblem::key(
            key,
            format!("expected string, got {}", value.type_name()),
        )),
        ValueType::Port => match value.as_int() {
            Some(port) if (1..=65535).contains(&port) => {}
            Some(port) => problems.push(SchemaProblem::key(
                key,
                format!("port {port} is outside 1..=65535"),
            )),
            None => problems.push(SchemaProblem::key(
                key,
                format!("expected integer, got {}", value.type_name()),
            )),
        },
        ValueType::OneOf(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => problems.push(SchemaProblem::key(
                key,
                format!("'{s}' is not one of: {}", quoted(allowed)),
            )),
            None => problems.push(SchemaProblem::key(
                key,
                format!("expected one of: {}, got {}", quoted(allowed), value.type_name()),
            )),
        },
        ValueType::RegistryValues => check_registry_values(key, value, problems),
        _ => {}
    }
}

fn check_registry_values(key: &str, value: &Value, problems: &mut Vec<SchemaProblem>) {
    let Some(items) = value.as_list() else {
        problems.push(SchemaProblem::key(
            key,
            format!("expected list of registry values, got {}", value.type_name()),
        ));
        return;
    };

    for (i, item) in items.iter().enumerate() {
        let item_key = format!("{key}[{i}]");
        let Some(map) = item.as_map() else {
            problems.push(SchemaProblem::key(
                &item_key,
                "expected a table with name, type and data",
            ));
            continue;
        };

        for field in map.keys() {
            if !matches!(field.as_str(), "name" | "type" | "data") {
                problems.push(SchemaProblem::key(&format!("{item_key}.{field}"), "unknown field"));
            }
        }
        if map.get("name").and_then(Value::as_str).is_none() {
            problems.push(SchemaProblem::key(&format!("{item_key}.name"), "string is required"));
        }
        match map.get("type").and_then(Value::as_str) {
            Some(t) if REGISTRY_VALUE_TYPES.contains(&t) => {}
            _ => problems.push(SchemaProblem::key(
                &format!("{item_key}.type"),
                format!("expected one of: {}", quoted(REGISTRY_VALUE_TYPES)),
            )),
        }
        match map.get("data") {
            Some(Value::Str(_) | Value::Int(_)) => {}
            Some(Value::List(parts)) if parts.iter().all(|p| p.as_str().is_some()) => {}
            _ => problems.push(SchemaProblem::key(
                &format!("{item_key}.data"),
                "expected string, integer or list of strings",
            )),
        }
    }
}

fn quoted(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check a declaration against its kind's schema, collecting every problem
pub fn validate(
    kind: ResourceKind,
    name: &str,
    attributes: &Attributes,
    actions: &[Action],
) -> Vec<SchemaProblem> {
    let mut problems = Vec::new();
    let schema = kind.schema();

    if name.trim().is_empty() {
        problems.push(SchemaProblem::general("name must not be empty"));
    }

    if actions.is_empty() {
        problems.push(SchemaProblem::general("at least one action is required"));
    }
    for action in actions {
        if !kind.allows(*action) {
            let legal: Vec<&str> = kind.actions().iter().map(Action::as_str).collect();
            problems.push(SchemaProblem::general(format!(
                "action '{action}' is not supported (expected one of: {})",
                quoted(&legal)
            )));
        }
    }

    for (key, value) in attributes {
        match schema.iter().find(|spec| spec.key == key) {
            Some(spec) => check_value(key, value, spec.value_type, &mut problems),
            None if schema.is_empty() => {
                problems.push(SchemaProblem::key(key, format!("{kind} takes no attributes")));
            }
            None => {
                let known: Vec<&str> = schema.iter().map(|spec| spec.key).collect();
                problems.push(SchemaProblem::key(
                    key,
                    format!("unknown attribute (expected one of: {})", quoted(&known)),
                ));
            }
        }
    }

    for spec in schema {
        if attributes.contains_key(spec.key) {
            continue;
        }
        if let Some(action) = actions.iter().find(|a| spec.required_for.contains(a)) {
            problems.push(SchemaProblem::key(
                spec.key,
                format!("required for action '{action}'"),
            ));
        }
    }

    if kind == ResourceKind::RegistryKey && !name.trim().is_empty() {
        let hive = name.split('\\').next().unwrap_or_default();
        if !REGISTRY_HIVES.iter().any(|h| h.eq_ignore_ascii_case(hive)) {
            problems.push(SchemaProblem::general(format!(
                "key must start with a registry hive, got '{hive}'"
            )));
        }
    }

    problems
}

// ============================================================================
// Declarations
// ============================================================================

/// A validated, immutable declaration of desired state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDeclaration {
    kind: ResourceKind,
    name: String,
    attributes: Attributes,
    actions: Vec<Action>,
    enabled: bool,
}

impl ResourceDeclaration {
    /// Build a declaration, validating it against the kind's schema
    ///
    /// An empty action list falls back to the kind's default action.
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        attributes: Attributes,
        actions: Vec<Action>,
    ) -> Result<Self> {
        Self::with_enabled(kind, name.into(), attributes, actions, true)
    }

    fn with_enabled(
        kind: ResourceKind,
        name: String,
        attributes: Attributes,
        mut actions: Vec<Action>,
        enabled: bool,
    ) -> Result<Self> {
        if actions.is_empty()
            && let Some(default) = kind.default_action()
        {
            actions.push(default);
        }

        let problems = validate(kind, &name, &attributes, &actions);
        if !problems.is_empty() {
            return Err(Error::Schema {
                kind,
                name,
                problems,
            });
        }

        Ok(Self {
            kind,
            name,
            attributes,
            actions,
            enabled,
        })
    }

    /// Start building a declaration
    pub fn builder(kind: ResourceKind, name: impl Into<String>) -> DeclarationBuilder {
        DeclarationBuilder {
            kind,
            name: name.into(),
            attributes: Attributes::new(),
            actions: Vec::new(),
            enabled: true,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Disabled declarations are reported but never probed or applied
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    pub fn bool_attr(&self, key: &str) -> Option<bool> {
        self.attr(key).and_then(Value::as_bool)
    }

    pub fn int_attr(&self, key: &str) -> Option<i64> {
        self.attr(key).and_then(Value::as_int)
    }
}

impl fmt::Display for ResourceDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

/// Builder for [`ResourceDeclaration`]
#[derive(Debug, Clone)]
pub struct DeclarationBuilder {
    kind: ResourceKind,
    name: String,
    attributes: Attributes,
    actions: Vec<Action>,
    enabled: bool,
}

impl DeclarationBuilder {
    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn build(self) -> Result<ResourceDeclaration> {
        ResourceDeclaration::with_enabled(
            self.kind,
            self.name,
            self.attributes,
            self.actions,
            self.enabled,
        )
    }
}

// ============================================================================
// Serialized Form
// ============================================================================

/// One action or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionList {
    One(String),
    Many(Vec<String>),
}

impl Default for ActionList {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl ActionList {
    fn names(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Unvalidated declaration as read from a recipe document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, alias = "action")]
    pub actions: ActionList,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<DeclarationSpec> for ResourceDeclaration {
    type Error = Error;

    fn try_from(spec: DeclarationSpec) -> Result<Self> {
        let kind: ResourceKind = spec.kind.parse()?;
        let actions = spec
            .actions
            .names()
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<Action>>>()?;

        Self::with_enabled(kind, spec.name, spec.attributes, actions, spec.enabled)
    }
}

/// Validate a whole declaration list before anything touches the system
///
/// Returns every failure with its position in the list rather than stopping
/// at the first one.
pub fn validate_all(
    specs: impl IntoIterator<Item = DeclarationSpec>,
) -> std::result::Result<Vec<ResourceDeclaration>, Vec<(usize, Error)>> {
    let mut declarations = Vec::new();
    let mut errors = Vec::new();

    for (index, spec) in specs.into_iter().enumerate() {
        match ResourceDeclaration::try_from(spec) {
            Ok(declaration) => declarations.push(declaration),
            Err(e) => errors.push((index, e)),
        }
    }

    if errors.is_empty() {
        Ok(declarations)
    } else {
        Err(errors)
    }
}
