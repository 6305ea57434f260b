//! Cisco IP-phone XML rendering of directory views.
//!
//! | View | Element |
//! |------|---------|
//! | root, group | `CiscoIPPhoneMenu` with `MenuItem` and `SoftKeyItem` children |
//! | contact detail | `CiscoIPPhoneDirectory` with one `DirectoryEntry` per number |
//! | not found | `CiscoIPPhoneText` |
//!
//! Menu item URLs are absolute, built from `server.public_url`, because the
//! phone fetches them directly.

use anyhow::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::error;

use contact_mirror_core::directory::{
    build_contact_detail, build_group, build_root, ContactDetailView, DirectoryMenu,
    DirectoryOptions, Link, NavAction,
};
use contact_mirror_core::error::QueryError;
use contact_mirror_core::keypad::GroupKey;
use contact_mirror_core::store::ContactStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Path of a navigation target, relative to the server root.
pub fn link_path(link: &Link) -> String {
    match link {
        Link::Root => "/directory".to_string(),
        Link::Group(key) => format!("/directory/groups/{}", group_segment(*key)),
        Link::Contact(id) => format!("/directory/contacts/{}", id),
    }
}

/// URL path segment for a group. `#` starts a fragment, so the catch-all
/// group is percent-encoded.
pub fn group_segment(key: GroupKey) -> &'static str {
    match key {
        GroupKey::Other => "%23",
        other => other.as_str(),
    }
}

struct XmlDoc {
    writer: Writer<Vec<u8>>,
}

impl XmlDoc {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn open(&mut self, tag: &str) -> Result<()> {
        self.writer.write_event(Event::Start(BytesStart::new(tag)))?;
        Ok(())
    }

    fn close(&mut self, tag: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }

    fn text_element(&mut self, tag: &str, text: &str) -> Result<()> {
        self.open(tag)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.close(tag)
    }

    fn soft_keys(&mut self, actions: &[NavAction], base_url: &str) -> Result<()> {
        for (i, action) in actions.iter().enumerate() {
            let (name, url) = match action {
                NavAction::Select => ("Select", "SoftKey:Select".to_string()),
                NavAction::Dial => ("Dial", "SoftKey:Dial".to_string()),
                NavAction::Exit => ("Exit", "SoftKey:Exit".to_string()),
                NavAction::Back(link) => ("Back", format!("{}{}", base_url, link_path(link))),
            };
            self.open("SoftKeyItem")?;
            self.text_element("Name", name)?;
            self.text_element("URL", &url)?;
            self.text_element("Position", &(i + 1).to_string())?;
            self.close("SoftKeyItem")?;
        }
        Ok(())
    }

    fn finish(self) -> Result<String> {
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}

pub fn render_menu(menu: &DirectoryMenu, base_url: &str) -> Result<String> {
    let mut doc = XmlDoc::new();
    doc.open("CiscoIPPhoneMenu")?;
    doc.text_element("Title", &menu.title)?;
    doc.text_element("Prompt", &menu.prompt)?;
    for entry in &menu.entries {
        doc.open("MenuItem")?;
        doc.text_element("Name", &entry.label)?;
        doc.text_element("URL", &format!("{}{}", base_url, link_path(&entry.link)))?;
        doc.close("MenuItem")?;
    }
    doc.soft_keys(&menu.actions, base_url)?;
    doc.close("CiscoIPPhoneMenu")?;
    doc.finish()
}

pub fn render_contact(view: &ContactDetailView, base_url: &str) -> Result<String> {
    let mut doc = XmlDoc::new();
    doc.open("CiscoIPPhoneDirectory")?;
    doc.text_element("Title", &view.title)?;
    doc.text_element(
        "Prompt",
        if view.entries.is_empty() {
            "No numbers"
        } else {
            "Select a number"
        },
    )?;
    for entry in &view.entries {
        doc.open("DirectoryEntry")?;
        doc.text_element("Name", &entry.label)?;
        doc.text_element("Telephone", &entry.number)?;
        doc.close("DirectoryEntry")?;
    }
    doc.soft_keys(&view.actions, base_url)?;
    doc.close("CiscoIPPhoneDirectory")?;
    doc.finish()
}

pub fn render_text(title: &str, text: &str) -> Result<String> {
    let mut doc = XmlDoc::new();
    doc.open("CiscoIPPhoneText")?;
    doc.text_element("Title", title)?;
    doc.text_element("Text", text)?;
    doc.close("CiscoIPPhoneText")?;
    doc.finish()
}

/// Root menu XML. Pure; never touches the store.
pub fn root_xml(options: &DirectoryOptions, base_url: &str) -> Result<String> {
    render_menu(&build_root(options), base_url)
}

/// Group menu XML. A store failure degrades to the empty group menu.
pub async fn group_xml(
    store: &dyn ContactStore,
    key: GroupKey,
    options: &DirectoryOptions,
    base_url: &str,
) -> Result<String> {
    let menu = match build_group(store, key, options).await {
        Ok(menu) => menu,
        Err(e) => {
            error!(group = key.as_str(), error = %e, "failed to build group menu");
            empty_group(key)
        }
    };
    render_menu(&menu, base_url)
}

fn empty_group(key: GroupKey) -> DirectoryMenu {
    DirectoryMenu {
        title: key.as_str().to_string(),
        prompt: "No contacts".to_string(),
        entries: Vec::new(),
        actions: vec![NavAction::Select, NavAction::Back(Link::Root), NavAction::Exit],
        truncated: false,
    }
}

/// Result of rendering a contact: found, or the not-found text screen.
///
/// A store failure renders an empty directory screen as `Found`, so the
/// phone always receives valid XML.
pub enum ContactXml {
    Found(String),
    NotFound(String),
}

pub async fn contact_xml(
    store: &dyn ContactStore,
    id: &str,
    base_url: &str,
) -> Result<ContactXml> {
    match build_contact_detail(store, id).await {
        Ok(view) => Ok(ContactXml::Found(render_contact(&view, base_url)?)),
        Err(QueryError::NotFound(_)) => Ok(ContactXml::NotFound(render_text(
            "Not found",
            "This contact is no longer available.",
        )?)),
        Err(e) => {
            error!(contact_id = id, error = %e, "failed to build contact detail");
            Ok(ContactXml::Found(render_contact(
                &unavailable_contact(id),
                base_url,
            )?))
        }
    }
}

fn unavailable_contact(id: &str) -> ContactDetailView {
    ContactDetailView {
        contact_id: id.to_string(),
        title: "Unavailable".to_string(),
        entries: Vec::new(),
        actions: vec![NavAction::Back(Link::Root), NavAction::Exit],
    }
}

/// What `cmirror directory` should print.
#[derive(Debug, Clone)]
pub enum DirectoryTarget {
    Root,
    Group(GroupKey),
    Contact(String),
}

/// `cmirror directory`: print the XML a phone would receive.
pub async fn run_directory(config: &Config, target: DirectoryTarget) -> Result<()> {
    let options = config.directory.options();
    let base_url = config.server.base_url();

    let xml = match target {
        DirectoryTarget::Root => root_xml(&options, &base_url)?,
        DirectoryTarget::Group(key) => {
            let pool = db::connect(config).await?;
            let store = SqliteStore::new(pool.clone());
            let xml = group_xml(&store, key, &options, &base_url).await;
            pool.close().await;
            xml?
        }
        DirectoryTarget::Contact(id) => {
            let pool = db::connect(config).await?;
            let store = SqliteStore::new(pool.clone());
            let xml = contact_xml(&store, &id, &base_url).await;
            pool.close().await;
            match xml? {
                ContactXml::Found(xml) => xml,
                ContactXml::NotFound(_) => anyhow::bail!("contact not found: {}", id),
            }
        }
    };

    println!("{}", xml);
    Ok(())
}
