//! Inner XML document (`<KeePassFile>`) reading and writing.
//!
//! Reading builds a small element tree, unmasks every `Protected="True"`
//! value in document order with the inner stream, then maps the tree onto
//! the model. Writing streams elements and masks protected values as they
//! are emitted, so both sides consume the keystream in the same order.
//! Children of `<Meta>`, `<Group>` and `<Entry>` that the model does not
//! interpret are kept as [`XmlElement`] subtrees and written back after the
//! known children, so settings written by other KeePass clients survive a
//! resave.

use chrono::{DateTime, Utc};
use data_encoding::BASE64;
use keelite_crypto_core::InnerStream;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::VaultError;
use crate::model::times::{decode_kdbx_time, encode_kdbx_time};
use crate::model::{
    BinaryRef, DeletedObject, Entry, FieldValue, Group, Metadata, ProtectedValue, Times,
    XmlElement,
};

/// `<Meta>` children mapped onto [`Metadata`] fields.
const META_FIELDS: &[&str] = &[
    "Generator",
    "DatabaseName",
    "DatabaseNameChanged",
    "DatabaseDescription",
    "DatabaseDescriptionChanged",
    "DefaultUserName",
    "RecycleBinEnabled",
    "RecycleBinUUID",
    "RecycleBinChanged",
    "HistoryMaxItems",
    "HistoryMaxSize",
];

/// `<Group>` children mapped onto [`Group`] fields.
const GROUP_FIELDS: &[&str] = &[
    "UUID",
    "Name",
    "Notes",
    "IconID",
    "Times",
    "IsExpanded",
    "Entry",
    "Group",
];

/// `<Entry>` children mapped onto [`Entry`] fields.
const ENTRY_FIELDS: &[&str] = &[
    "UUID",
    "IconID",
    "ForegroundColor",
    "BackgroundColor",
    "OverrideURL",
    "Tags",
    "Times",
    "String",
    "Binary",
    "History",
];

/// What the XML carries besides the credentials and container settings.
#[derive(Debug)]
pub struct XmlContent {
    pub meta: Metadata,
    pub root: Group,
    pub deleted_objects: Vec<DeletedObject>,
}

fn xml_err(err: impl std::fmt::Display) -> VaultError {
    VaultError::Xml(err.to_string())
}

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    protected: Option<Zeroizing<Vec<u8>>>,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn is_protected(&self) -> bool {
        self.attr("Protected")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    fn string_of(&self, name: &str) -> String {
        self.text_of(name).unwrap_or_default().to_owned()
    }

    fn bool_of(&self, name: &str, default: bool) -> bool {
        self.text_of(name).map_or(default, parse_bool)
    }

    fn time_of(&self, name: &str) -> Result<Option<DateTime<Utc>>, VaultError> {
        match self.text_of(name).map(str::trim) {
            Some(text) if !text.is_empty() => decode_kdbx_time(text).map(Some),
            _ => Ok(None),
        }
    }

    fn uuid_of(&self, name: &str) -> Result<Option<Uuid>, VaultError> {
        match self.text_of(name).map(str::trim) {
            Some(text) if !text.is_empty() => decode_uuid(text).map(Some),
            _ => Ok(None),
        }
    }

    fn parse_of<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.text_of(name).and_then(|t| t.trim().parse().ok())
    }
}

fn parse_bool(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("true")
}

fn decode_uuid(text: &str) -> Result<Uuid, VaultError> {
    let bytes = BASE64
        .decode(text.as_bytes())
        .map_err(|e| VaultError::Xml(format!("invalid UUID {text}: {e}")))?;
    Uuid::from_slice(&bytes).map_err(|e| VaultError::Xml(format!("invalid UUID {text}: {e}")))
}

fn encode_uuid(uuid: &Uuid) -> String {
    BASE64.encode(uuid.as_bytes())
}

fn parse_tree(xml: &[u8]) -> Result<Node, VaultError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Node> = vec![Node::default()];

    loop {
        let event = reader.read_event_into(&mut buf).map_err(xml_err)?;
        match event {
            Event::Start(e) => stack.push(start_node(&e)?),
            Event::Empty(e) => {
                let node = start_node(&e)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| VaultError::Xml("unbalanced end tag".into()))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| VaultError::Xml("unbalanced end tag".into()))?;
                parent.children.push(node);
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(xml_err)?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8(c.into_inner().into_owned()).map_err(xml_err)?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(VaultError::Xml("unexpected end of document".into()));
    }
    let document = stack.pop().unwrap_or_default();
    document
        .children
        .into_iter()
        .find(|n| n.name == "KeePassFile")
        .ok_or_else(|| VaultError::Xml("missing KeePassFile element".into()))
}

fn start_node(e: &BytesStart<'_>) -> Result<Node, VaultError> {
    let name = String::from_utf8(e.name().as_ref().to_vec()).map_err(xml_err)?;
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8(attr.key.as_ref().to_vec()).map_err(xml_err)?;
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        attrs.push((key, value));
    }
    Ok(Node {
        name,
        attrs,
        ..Node::default()
    })
}

/// Unmask protected values in document (pre-)order.
fn unmask(node: &mut Node, stream: &mut InnerStream) -> Result<(), VaultError> {
    if node.is_protected() {
        let mut bytes = Zeroizing::new(
            BASE64
                .decode(node.text.trim().as_bytes())
                .map_err(|e| VaultError::Xml(format!("protected value: {e}")))?,
        );
        stream.apply(&mut bytes)?;
        node.protected = Some(bytes);
    }
    for child in &mut node.children {
        unmask(child, stream)?;
    }
    Ok(())
}

/// Copy a subtree into the model. Whitespace between child elements is
/// dropped; protected content moves into a [`ProtectedValue`].
fn foreign(node: &Node) -> Result<XmlElement, VaultError> {
    let protected = node
        .protected
        .as_ref()
        .map(|bytes| ProtectedValue::from_bytes(bytes))
        .transpose()?;
    let layout_only = !node.children.is_empty() && node.text.trim().is_empty();
    let text = if protected.is_some() || layout_only {
        String::new()
    } else {
        node.text.clone()
    };
    Ok(XmlElement {
        name: node.name.clone(),
        attributes: node.attrs.clone(),
        text,
        protected,
        children: node.children.iter().map(foreign).collect::<Result<_, _>>()?,
    })
}

/// Children of `node` whose names are not in `known`.
fn unknown_children(node: &Node, known: &[&str]) -> Result<Vec<XmlElement>, VaultError> {
    node.children
        .iter()
        .filter(|c| !known.contains(&c.name.as_str()))
        .map(foreign)
        .collect()
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Parse the inner XML.
///
/// # Errors
///
/// Returns [`VaultError::Xml`] for malformed XML or values, and
/// [`VaultError::Crypto`] if the inner stream fails.
pub fn read(xml: &[u8], stream: &mut InnerStream) -> Result<XmlContent, VaultError> {
    let mut file = parse_tree(xml)?;
    unmask(&mut file, stream)?;

    let meta_node = file
        .child("Meta")
        .ok_or_else(|| VaultError::Xml("missing Meta element".into()))?;
    let meta = read_meta(meta_node)?;

    let root_node = file
        .child("Root")
        .ok_or_else(|| VaultError::Xml("missing Root element".into()))?;
    let root = root_node
        .child("Group")
        .map(read_group)
        .transpose()?
        .ok_or_else(|| VaultError::Xml("missing root group".into()))?;

    let mut deleted_objects = Vec::new();
    if let Some(deleted) = root_node.child("DeletedObjects") {
        for node in deleted.children_named("DeletedObject") {
            let Some(uuid) = node.uuid_of("UUID")? else {
                continue;
            };
            deleted_objects.push(DeletedObject {
                uuid,
                deleted_at: node.time_of("DeletionTime")?.unwrap_or_default(),
            });
        }
    }

    Ok(XmlContent {
        meta,
        root,
        deleted_objects,
    })
}

fn read_meta(node: &Node) -> Result<Metadata, VaultError> {
    let defaults = Metadata::new("");
    Ok(Metadata {
        generator: node.string_of("Generator"),
        name: node.string_of("DatabaseName"),
        name_changed: node
            .time_of("DatabaseNameChanged")?
            .unwrap_or(defaults.name_changed),
        description: node.string_of("DatabaseDescription"),
        description_changed: node
            .time_of("DatabaseDescriptionChanged")?
            .unwrap_or(defaults.description_changed),
        default_user_name: node.string_of("DefaultUserName"),
        recycle_bin_enabled: node.bool_of("RecycleBinEnabled", true),
        recycle_bin_uuid: node.uuid_of("RecycleBinUUID")?.filter(|u| !u.is_nil()),
        recycle_bin_changed: node
            .time_of("RecycleBinChanged")?
            .unwrap_or(defaults.recycle_bin_changed),
        history_max_items: node
            .parse_of("HistoryMaxItems")
            .unwrap_or(defaults.history_max_items),
        history_max_size: node
            .parse_of("HistoryMaxSize")
            .unwrap_or(defaults.history_max_size),
        extra: unknown_children(node, META_FIELDS)?,
    })
}

fn read_times(node: Option<&Node>) -> Result<Times, VaultError> {
    let mut times = Times::now();
    let Some(node) = node else {
        return Ok(times);
    };
    if let Some(t) = node.time_of("CreationTime")? {
        times.creation = t;
    }
    times.last_modification = node.time_of("LastModificationTime")?;
    if let Some(t) = node.time_of("LastAccessTime")? {
        times.last_access = t;
    }
    if let Some(t) = node.time_of("ExpiryTime")? {
        times.expiry = t;
    }
    times.expires = node.bool_of("Expires", false);
    times.usage_count = node.parse_of("UsageCount").unwrap_or(0);
    if let Some(t) = node.time_of("LocationChanged")? {
        times.location_changed = t;
    }
    Ok(times)
}

fn read_group(node: &Node) -> Result<Group, VaultError> {
    let uuid = node
        .uuid_of("UUID")?
        .ok_or_else(|| VaultError::Xml("group without UUID".into()))?;
    let mut group = Group::new(uuid, &node.string_of("Name"));
    group.notes = node.string_of("Notes");
    group.icon_id = node.parse_of("IconID").unwrap_or(group.icon_id);
    group.times = read_times(node.child("Times"))?;
    group.is_expanded = node.bool_of("IsExpanded", true);
    group.extra = unknown_children(node, GROUP_FIELDS)?;
    for child in &node.children {
        match child.name.as_str() {
            "Entry" => group.entries.push(read_entry(child, true)?),
            "Group" => group.groups.push(read_group(child)?),
            _ => {}
        }
    }
    Ok(group)
}

fn read_entry(node: &Node, with_history: bool) -> Result<Entry, VaultError> {
    let uuid = node
        .uuid_of("UUID")?
        .ok_or_else(|| VaultError::Xml("entry without UUID".into()))?;
    let mut entry = Entry::new(uuid);
    entry.clear_fields();
    entry.icon_id = node.parse_of("IconID").unwrap_or(0);
    entry.foreground_color = node.string_of("ForegroundColor");
    entry.background_color = node.string_of("BackgroundColor");
    entry.override_url = node.string_of("OverrideURL");
    entry.tags = split_tags(node.text_of("Tags").unwrap_or_default());
    entry.times = read_times(node.child("Times"))?;
    entry.extra = unknown_children(node, ENTRY_FIELDS)?;

    for field in node.children_named("String") {
        let key = field.string_of("Key");
        let value = match field.child("Value") {
            Some(v) => match &v.protected {
                Some(bytes) => FieldValue::Protected(ProtectedValue::from_bytes(bytes)?),
                None => FieldValue::PlainText(v.text.clone()),
            },
            None => FieldValue::PlainText(String::new()),
        };
        entry.set_field(&key, value);
    }

    for binary in node.children_named("Binary") {
        let pool_index = binary
            .child("Value")
            .and_then(|v| v.attr("Ref"))
            .and_then(|r| r.trim().parse().ok());
        if let Some(pool_index) = pool_index {
            entry.binaries.push(BinaryRef {
                name: binary.string_of("Key"),
                pool_index,
            });
        }
    }

    if with_history {
        if let Some(history) = node.child("History") {
            for snapshot in history.children_named("Entry") {
                entry.history.push(read_entry(snapshot, false)?);
            }
        }
    }
    Ok(entry)
}

fn split_tags(text: &str) -> Vec<String> {
    text.split([';', ','])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

struct XmlWriter<'s> {
    writer: Writer<Vec<u8>>,
    stream: &'s mut InnerStream,
}

impl XmlWriter<'_> {
    fn emit(&mut self, event: Event<'_>) -> Result<(), VaultError> {
        self.writer.write_event(event).map_err(xml_err)
    }

    fn open(&mut self, name: &str) -> Result<(), VaultError> {
        self.emit(Event::Start(BytesStart::new(name)))
    }

    fn close(&mut self, name: &str) -> Result<(), VaultError> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, name: &str, value: &str) -> Result<(), VaultError> {
        self.open(name)?;
        self.emit(Event::Text(BytesText::new(value)))?;
        self.close(name)
    }

    fn bool(&mut self, name: &str, value: bool) -> Result<(), VaultError> {
        self.text(name, if value { "True" } else { "False" })
    }

    fn time(&mut self, name: &str, value: &DateTime<Utc>) -> Result<(), VaultError> {
        self.text(name, &encode_kdbx_time(value))
    }

    fn uuid(&mut self, name: &str, value: &Uuid) -> Result<(), VaultError> {
        self.text(name, &encode_uuid(value))
    }

    fn masked_text(&mut self, plaintext: &[u8]) -> Result<(), VaultError> {
        let mut masked = Zeroizing::new(plaintext.to_vec());
        self.stream.apply(&mut masked)?;
        let encoded = BASE64.encode(&masked);
        self.emit(Event::Text(BytesText::new(&encoded)))
    }

    fn protected(&mut self, name: &str, plaintext: &[u8]) -> Result<(), VaultError> {
        let mut start = BytesStart::new(name);
        start.push_attribute(("Protected", "True"));
        self.emit(Event::Start(start))?;
        self.masked_text(plaintext)?;
        self.close(name)
    }

    fn element(&mut self, element: &XmlElement) -> Result<(), VaultError> {
        let mut start = BytesStart::new(element.name.as_str());
        for (key, value) in &element.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if let Some(value) = &element.protected {
            if !element.attributes.iter().any(|(key, _)| key == "Protected") {
                start.push_attribute(("Protected", "True"));
            }
            self.emit(Event::Start(start))?;
            self.masked_text(&value.reveal_bytes())?;
            return self.close(&element.name);
        }
        if element.text.is_empty() && element.children.is_empty() {
            return self.emit(Event::Empty(start));
        }
        self.emit(Event::Start(start))?;
        if !element.text.is_empty() {
            self.emit(Event::Text(BytesText::new(&element.text)))?;
        }
        for child in &element.children {
            self.element(child)?;
        }
        self.close(&element.name)
    }

    fn elements(&mut self, elements: &[XmlElement]) -> Result<(), VaultError> {
        elements.iter().try_for_each(|e| self.element(e))
    }

    fn meta(&mut self, meta: &Metadata) -> Result<(), VaultError> {
        self.open("Meta")?;
        self.text("Generator", &meta.generator)?;
        self.text("DatabaseName", &meta.name)?;
        self.time("DatabaseNameChanged", &meta.name_changed)?;
        self.text("DatabaseDescription", &meta.description)?;
        self.time("DatabaseDescriptionChanged", &meta.description_changed)?;
        self.text("DefaultUserName", &meta.default_user_name)?;
        if !meta.extra.iter().any(|e| e.name == "MemoryProtection") {
            self.open("MemoryProtection")?;
            self.bool("ProtectTitle", false)?;
            self.bool("ProtectUserName", false)?;
            self.bool("ProtectPassword", true)?;
            self.bool("ProtectURL", false)?;
            self.bool("ProtectNotes", false)?;
            self.close("MemoryProtection")?;
        }
        self.bool("RecycleBinEnabled", meta.recycle_bin_enabled)?;
        self.uuid("RecycleBinUUID", &meta.recycle_bin_uuid.unwrap_or_default())?;
        self.time("RecycleBinChanged", &meta.recycle_bin_changed)?;
        self.text("HistoryMaxItems", &meta.history_max_items.to_string())?;
        self.text("HistoryMaxSize", &meta.history_max_size.to_string())?;
        self.elements(&meta.extra)?;
        self.close("Meta")
    }

    fn times(&mut self, times: &Times) -> Result<(), VaultError> {
        self.open("Times")?;
        self.time("CreationTime", &times.creation)?;
        if let Some(t) = &times.last_modification {
            self.time("LastModificationTime", t)?;
        }
        self.time("LastAccessTime", &times.last_access)?;
        self.time("ExpiryTime", &times.expiry)?;
        self.bool("Expires", times.expires)?;
        self.text("UsageCount", &times.usage_count.to_string())?;
        self.time("LocationChanged", &times.location_changed)?;
        self.close("Times")
    }

    fn group(&mut self, group: &Group) -> Result<(), VaultError> {
        self.open("Group")?;
        self.uuid("UUID", &group.uuid)?;
        self.text("Name", &group.name)?;
        self.text("Notes", &group.notes)?;
        self.text("IconID", &group.icon_id.to_string())?;
        self.times(&group.times)?;
        self.bool("IsExpanded", group.is_expanded)?;
        self.elements(&group.extra)?;
        for entry in &group.entries {
            self.entry(entry, true)?;
        }
        for child in &group.groups {
            self.group(child)?;
        }
        self.close("Group")
    }

    fn entry(&mut self, entry: &Entry, with_history: bool) -> Result<(), VaultError> {
        self.open("Entry")?;
        self.uuid("UUID", &entry.uuid)?;
        self.text("IconID", &entry.icon_id.to_string())?;
        self.text("ForegroundColor", &entry.foreground_color)?;
        self.text("BackgroundColor", &entry.background_color)?;
        self.text("OverrideURL", &entry.override_url)?;
        self.text("Tags", &entry.tags.join(";"))?;
        self.times(&entry.times)?;
        for (key, value) in entry.fields() {
            self.open("String")?;
            self.text("Key", key)?;
            match value {
                FieldValue::PlainText(text) => self.text("Value", text)?,
                FieldValue::Protected(p) => self.protected("Value", &p.reveal_bytes())?,
            }
            self.close("String")?;
        }
        for binary in &entry.binaries {
            self.open("Binary")?;
            self.text("Key", &binary.name)?;
            let index = binary.pool_index.to_string();
            let mut value = BytesStart::new("Value");
            value.push_attribute(("Ref", index.as_str()));
            self.emit(Event::Empty(value))?;
            self.close("Binary")?;
        }
        self.elements(&entry.extra)?;
        if with_history {
            self.open("History")?;
            for snapshot in &entry.history {
                self.entry(snapshot, false)?;
            }
            self.close("History")?;
        }
        self.close("Entry")
    }
}

/// Serialize the document content, masking protected values with `stream`.
///
/// # Errors
///
/// Returns [`VaultError::Xml`] if writing fails, and [`VaultError::Crypto`]
/// if the inner stream fails.
pub fn write(
    meta: &Metadata,
    root: &Group,
    deleted_objects: &[DeletedObject],
    stream: &mut InnerStream,
) -> Result<Vec<u8>, VaultError> {
    let mut w = XmlWriter {
        writer: Writer::new(Vec::new()),
        stream,
    };
    w.emit(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))?;
    w.open("KeePassFile")?;
    w.meta(meta)?;
    w.open("Root")?;
    w.group(root)?;
    w.open("DeletedObjects")?;
    for deleted in deleted_objects {
        w.open("DeletedObject")?;
        w.uuid("UUID", &deleted.uuid)?;
        w.time("DeletionTime", &deleted.deleted_at)?;
        w.close("DeletedObject")?;
    }
    w.close("DeletedObjects")?;
    w.close("Root")?;
    w.close("KeePassFile")?;
    Ok(w.writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelite_crypto_core::InnerStreamAlgorithm;

    fn stream() -> InnerStream {
        InnerStream::new(InnerStreamAlgorithm::ChaCha20, &[8u8; 64]).unwrap()
    }

    fn content() -> XmlContent {
        let mut root = Group::new(Uuid::from_u128(1), "Root & <Friends>");
        let mut entry = Entry::new(Uuid::from_u128(2));
        entry.set_field("Title", "Mail".into());
        entry.set_field(
            "Password",
            FieldValue::Protected(ProtectedValue::from_text(" pa;ss ").unwrap()),
        );
        entry.tags = vec!["Work".into(), "Mail".into()];
        entry.binaries.push(BinaryRef {
            name: "key.pem".into(),
            pool_index: 0,
        });
        entry.push_history();
        entry.set_field(
            "Password",
            FieldValue::Protected(ProtectedValue::from_text("new").unwrap()),
        );
        root.entries.push(entry);
        root.groups.push(Group::new(Uuid::from_u128(3), "Trash"));
        let mut meta = Metadata::new("Vault");
        meta.recycle_bin_uuid = Some(Uuid::from_u128(3));
        XmlContent {
            meta,
            root,
            deleted_objects: vec![DeletedObject {
                uuid: Uuid::from_u128(9),
                deleted_at: crate::model::times::now(),
            }],
        }
    }

    fn write_content(c: &XmlContent) -> Vec<u8> {
        write(&c.meta, &c.root, &c.deleted_objects, &mut stream()).unwrap()
    }

    #[test]
    fn write_then_read_preserves_content() {
        let original = content();
        let xml = write_content(&original);
        let parsed = read(&xml, &mut stream()).unwrap();
        assert_eq!(parsed.meta, original.meta);
        assert_eq!(parsed.root, original.root);
        assert_eq!(parsed.deleted_objects, original.deleted_objects);
    }

    #[test]
    fn protected_values_are_not_plaintext_in_xml() {
        let xml = write_content(&content());
        let text = String::from_utf8(xml).unwrap();
        assert!(!text.contains(" pa;ss "));
        assert!(text.contains("Protected=\"True\""));
    }

    #[test]
    fn wrong_stream_key_garbles_protected_values() {
        let xml = write_content(&content());
        let mut other = InnerStream::new(InnerStreamAlgorithm::ChaCha20, &[1u8; 64]).unwrap();
        let parsed = read(&xml, &mut other).unwrap();
        let entry = parsed.root.find_entry(Uuid::from_u128(2)).unwrap();
        assert_ne!(entry.field_text("Password"), "new");
    }

    #[test]
    fn history_snapshots_are_flat() {
        let xml = write_content(&content());
        let parsed = read(&xml, &mut stream()).unwrap();
        let entry = parsed.root.find_entry(Uuid::from_u128(2)).unwrap();
        assert_eq!(entry.history.len(), 1);
        assert_eq!(entry.history[0].field_text("Password"), " pa;ss ");
        assert!(entry.history[0].history.is_empty());
    }

    #[test]
    fn tags_split_on_both_separators() {
        assert_eq!(split_tags("a; b,c;;"), ["a", "b", "c"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn nil_recycle_bin_reads_as_none() {
        let mut c = content();
        c.meta.recycle_bin_uuid = None;
        let xml = write_content(&c);
        assert!(read(&xml, &mut stream()).unwrap().meta.recycle_bin_uuid.is_none());
    }

    #[test]
    fn unknown_elements_are_kept() {
        let xml = br#"<?xml version="1.0"?><KeePassFile><Meta><DatabaseName>x</DatabaseName><CustomIcons/></Meta><Root><Group><UUID>AAAAAAAAAAAAAAAAAAAAAQ==</UUID><Name>R</Name><Unknown><Deep/></Unknown></Group></Root></KeePassFile>"#;
        let parsed = read(xml, &mut stream()).unwrap();
        assert_eq!(parsed.meta.name, "x");
        assert_eq!(parsed.root.uuid, Uuid::from_u128(1));
        let names: Vec<_> = parsed.meta.extra.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["CustomIcons"]);
        assert_eq!(parsed.root.extra.len(), 1);
        assert_eq!(parsed.root.extra[0].name, "Unknown");
        assert_eq!(parsed.root.extra[0].children, [XmlElement::new("Deep")]);
    }

    #[test]
    fn entry_auto_type_and_custom_data_survive_resave() {
        let xml = br#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<KeePassFile>
	<Meta>
		<Generator>KeePassXC</Generator>
		<DatabaseName>Foreign</DatabaseName>
		<MemoryProtection>
			<ProtectTitle>False</ProtectTitle>
			<ProtectUserName>True</ProtectUserName>
			<ProtectPassword>True</ProtectPassword>
			<ProtectURL>False</ProtectURL>
			<ProtectNotes>False</ProtectNotes>
		</MemoryProtection>
	</Meta>
	<Root>
		<Group>
			<UUID>AAAAAAAAAAAAAAAAAAAAAQ==</UUID>
			<Name>Root</Name>
			<EnableAutoType>null</EnableAutoType>
			<Entry>
				<UUID>AAAAAAAAAAAAAAAAAAAAAg==</UUID>
				<IconID>0</IconID>
				<String>
					<Key>Title</Key>
					<Value>Mail</Value>
				</String>
				<AutoType>
					<Enabled>True</Enabled>
					<DataTransferObfuscation>0</DataTransferObfuscation>
					<DefaultSequence>{USERNAME}{TAB}{PASSWORD}</DefaultSequence>
				</AutoType>
				<CustomData>
					<Item>
						<Key>KPXC_X</Key>
						<Value>keep-me</Value>
					</Item>
				</CustomData>
			</Entry>
		</Group>
	</Root>
</KeePassFile>"#;
        let first = read(xml, &mut stream()).unwrap();
        let rewritten = write_content(&first);
        let text = String::from_utf8(rewritten.clone()).unwrap();
        assert!(text.contains("<DefaultSequence>{USERNAME}{TAB}{PASSWORD}</DefaultSequence>"));
        assert!(text.contains("<Value>keep-me</Value>"));
        assert!(text.contains("<EnableAutoType>null</EnableAutoType>"));
        assert!(text.contains("<ProtectUserName>True</ProtectUserName>"));
        assert_eq!(text.matches("<MemoryProtection>").count(), 1);

        let second = read(&rewritten, &mut stream()).unwrap();
        let entry = second.root.find_entry(Uuid::from_u128(2)).unwrap();
        assert_eq!(
            entry.extra[0].text_at(&["DefaultSequence"]),
            Some("{USERNAME}{TAB}{PASSWORD}")
        );
        assert_eq!(
            entry.extra[1].text_at(&["Item", "Value"]),
            Some("keep-me")
        );
        assert_eq!(second.meta, first.meta);
        assert_eq!(second.root, first.root);
    }

    #[test]
    fn protected_unknown_element_is_masked_and_restored() {
        let mut c = content();
        let mut secret = XmlElement::new("Secret");
        secret.protected = Some(ProtectedValue::from_text("hidden value").unwrap());
        let mut wrapper = XmlElement::new("Extension");
        wrapper.children.push(secret);
        c.root.entries[0].extra.push(wrapper);

        let xml = write_content(&c);
        assert!(!String::from_utf8(xml.clone()).unwrap().contains("hidden value"));
        let parsed = read(&xml, &mut stream()).unwrap();
        let entry = parsed.root.find_entry(Uuid::from_u128(2)).unwrap();
        let restored = entry.extra[0].child("Secret").unwrap();
        assert_eq!(
            restored.protected.as_ref().unwrap().reveal_text(),
            "hidden value"
        );
        assert_eq!(entry.field_text("Password"), "new");
    }

    #[test]
    fn new_entry_writes_protected_empty_password() {
        let mut c = content();
        c.root.entries.push(Entry::new(Uuid::from_u128(4)));
        let text = String::from_utf8(write_content(&c)).unwrap();
        assert_eq!(text.matches("<Key>Password</Key>").count(), 3);
        let parsed = read(text.as_bytes(), &mut stream()).unwrap();
        let fresh = parsed.root.find_entry(Uuid::from_u128(4)).unwrap();
        assert!(fresh.field("Password").unwrap().is_protected());
        assert_eq!(fresh.field_text("Password"), "");
    }

    #[test]
    fn missing_root_is_xml_error() {
        let xml = b"<KeePassFile><Meta/></KeePassFile>";
        assert!(matches!(read(xml, &mut stream()), Err(VaultError::Xml(_))));
    }
}
