//! Module containing the manifest decoding logic.
//!
//! The binary document is first decoded into an element tree, then the facts the rest of the
//! analysis needs are derived from it. Fact extraction never fails: absent or unusable values
//! fall back to [`UNKNOWN`] and leave a diagnostic behind.

mod binary_xml;

pub use self::binary_xml::{AttributeValue, Element};
use crate::error::ManifestError;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::Serialize;
use std::{collections::HashSet, fmt, str::FromStr};

/// Path of the manifest inside the package.
pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Sentinel reported for facts the manifest does not provide.
pub const UNKNOWN: &str = "unknown";

/// Tags declaring a requested permission.
const PERMISSION_TAGS: [&str; 3] = [
    "uses-permission",
    "uses-permission-sdk-23",
    "uses-permission-sdk-m",
];

lazy_static! {
    static ref PERMISSION_NAME: Regex = Regex::new(r"^[^\s\p{Cc}]{1,256}$")
        .expect("permission name pattern is valid");
}

/// Decodes a binary manifest and derives its facts.
pub fn decode(bytes: &[u8]) -> Result<ManifestDocument, ManifestError> {
    let root = binary_xml::parse_document(bytes)?;
    let document = ManifestDocument::from_root(root);
    debug!(
        "manifest decoded: package {}, {} permissions, {} components",
        document.package(),
        document.permissions().len(),
        document.components().len()
    );
    Ok(document)
}

/// Kind of an application component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    /// `<activity>`.
    Activity,
    /// `<activity-alias>`.
    ActivityAlias,
    /// `<service>`.
    Service,
    /// `<receiver>`.
    Receiver,
    /// `<provider>`.
    Provider,
}

impl ComponentKind {
    /// Gets the manifest tag of the component kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::ActivityAlias => "activity-alias",
            Self::Service => "service",
            Self::Receiver => "receiver",
            Self::Provider => "provider",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activity" => Ok(Self::Activity),
            "activity-alias" => Ok(Self::ActivityAlias),
            "service" => Ok(Self::Service),
            "receiver" => Ok(Self::Receiver),
            "provider" => Ok(Self::Provider),
            _ => Err(()),
        }
    }
}

/// Component declared by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    kind: ComponentKind,
    name: String,
    exported: Option<bool>,
}

impl Component {
    /// Gets the component kind.
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Gets the fully qualified class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the explicit `exported` flag, if declared.
    pub fn exported(&self) -> Option<bool> {
        self.exported
    }
}

/// Decoded manifest and the facts derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestDocument {
    root: Option<Element>,
    package: Option<String>,
    version_name: Option<String>,
    version_code: Option<String>,
    min_sdk: Option<u32>,
    target_sdk: Option<u32>,
    permissions: Vec<String>,
    defined_permissions: Vec<String>,
    components: Vec<Component>,
    debuggable: bool,
    allow_backup: Option<bool>,
    diagnostics: Vec<String>,
}

impl ManifestDocument {
    /// Creates a document with every fact unknown, used when the manifest is unavailable.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Derives the facts of a decoded tree.
    pub fn from_root(root: Element) -> Self {
        let mut document = Self::default();
        if root.name() == "manifest" {
            document.load_facts(&root);
        } else {
            document.diagnostics.push(format!(
                "The manifest root element is <{}> instead of <manifest>.",
                root.name()
            ));
        }
        document.root = Some(root);
        document
    }

    fn load_facts(&mut self, root: &Element) {
        self.package = match root.attribute("package") {
            Some(AttributeValue::String(package)) if !package.trim().is_empty() => {
                Some(package.clone())
            }
            Some(other) => {
                self.diagnostics.push(format!(
                    "The manifest package attribute is not a usable name ({}).",
                    other
                ));
                None
            }
            None => None,
        };

        self.version_code = self.version_string(root, "versionCode");
        self.version_name = self.version_string(root, "versionName");

        if let Some(sdk) = root.children_named("uses-sdk").next() {
            self.min_sdk = self.api_level(sdk, "minSdkVersion");
            self.target_sdk = self.api_level(sdk, "targetSdkVersion");
        }

        let mut requested = HashSet::new();
        let mut defined = HashSet::new();
        for child in root.children() {
            if PERMISSION_TAGS.contains(&child.name()) {
                self.add_permission(child, &mut requested);
            } else if child.name() == "permission" {
                if let Some(name) = child.attribute("name").and_then(AttributeValue::as_str) {
                    if defined.insert(name) {
                        self.defined_permissions.push(name.to_owned());
                    }
                }
            }
        }

        if let Some(application) = root.children_named("application").next() {
            self.load_application(application);
        }
    }

    fn version_string(&mut self, root: &Element, attribute: &str) -> Option<String> {
        match root.attribute(attribute)? {
            AttributeValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
            AttributeValue::Integer(i) => Some(i.to_string()),
            other => {
                self.diagnostics.push(format!(
                    "The manifest {} cannot be resolved statically ({}).",
                    attribute, other
                ));
                None
            }
        }
    }

    fn api_level(&mut self, sdk: &Element, attribute: &str) -> Option<u32> {
        let level = match sdk.attribute(attribute)? {
            AttributeValue::Integer(i) => u32::try_from(*i).ok(),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if level.is_none() {
            self.diagnostics.push(format!(
                "The manifest {} is not a platform API level ({}).",
                attribute,
                sdk.attribute(attribute)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            ));
        }
        level
    }

    fn add_permission<'e>(&mut self, declaration: &'e Element, seen: &mut HashSet<&'e str>) {
        match declaration.attribute("name") {
            Some(AttributeValue::String(name)) if PERMISSION_NAME.is_match(name) => {
                if seen.insert(name) {
                    self.permissions.push(name.clone());
                }
            }
            Some(AttributeValue::String(name)) => self.diagnostics.push(format!(
                "Dropped the malformed permission name {:?}.",
                name
            )),
            Some(other) => self.diagnostics.push(format!(
                "Dropped a <{}> declaration whose name is not a string ({}).",
                declaration.name(),
                other
            )),
            None => self.diagnostics.push(format!(
                "Dropped a <{}> declaration without a name.",
                declaration.name()
            )),
        }
    }

    fn load_application(&mut self, application: &Element) {
        self.debuggable = application
            .attribute("debuggable")
            .and_then(AttributeValue::as_bool)
            .unwrap_or(false);
        self.allow_backup = application
            .attribute("allowBackup")
            .and_then(AttributeValue::as_bool);

        for child in application.children() {
            let kind = match child.name().parse::<ComponentKind>() {
                Ok(kind) => kind,
                Err(()) => continue,
            };
            let name = match child.attribute("name").and_then(AttributeValue::as_str) {
                Some(name) if !name.is_empty() => name,
                _ => continue,
            };
            let name = match (name.starts_with('.'), &self.package) {
                (true, Some(package)) => format!("{}{}", package, name),
                _ => name.to_owned(),
            };

            self.components.push(Component {
                kind,
                name,
                exported: child.attribute("exported").and_then(AttributeValue::as_bool),
            });
        }
    }

    /// Gets the decoded element tree, if the manifest could be decoded.
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    /// Gets the package name, or [`UNKNOWN`].
    pub fn package(&self) -> &str {
        self.package.as_deref().unwrap_or(UNKNOWN)
    }

    /// Whether the manifest declares a package name.
    pub fn has_package(&self) -> bool {
        self.package.is_some()
    }

    /// Gets the version name, or [`UNKNOWN`].
    pub fn version_name(&self) -> &str {
        self.version_name.as_deref().unwrap_or(UNKNOWN)
    }

    /// Gets the version code, or [`UNKNOWN`].
    pub fn version_code(&self) -> &str {
        self.version_code.as_deref().unwrap_or(UNKNOWN)
    }

    /// Whether the manifest declares a version code.
    pub fn has_version_code(&self) -> bool {
        self.version_code.is_some()
    }

    /// Gets the minimum platform API level.
    pub fn min_sdk(&self) -> Option<u32> {
        self.min_sdk
    }

    /// Gets the target platform API level.
    pub fn target_sdk(&self) -> Option<u32> {
        self.target_sdk
    }

    /// Gets the requested permissions, deduplicated, in first-seen order.
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// Gets the permissions the application defines for others.
    pub fn defined_permissions(&self) -> &[String] {
        &self.defined_permissions
    }

    /// Gets the declared components.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Whether the application is marked as debuggable.
    pub fn is_debuggable(&self) -> bool {
        self.debuggable
    }

    /// Gets the explicit `allowBackup` flag, if declared.
    pub fn allow_backup(&self) -> Option<bool> {
        self.allow_backup
    }

    /// Gets the notes left by fact extraction.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}
