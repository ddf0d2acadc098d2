use chrono::{DateTime, FixedOffset, Utc};
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};

use super::types::*;
use super::xml::{IWrite, QWrite, Writer, DAV_NS};

/// Render a request body: XML declaration, then `elem` as the root
/// element carrying the `xmlns:D="DAV:"` declaration. No indentation is
/// added, so the output is byte-for-byte reproducible.
pub async fn serialize<T: QWrite + Sync>(elem: &T) -> Result<Vec<u8>, quick_xml::Error> {
    let mut buffer = Vec::new();
    {
        let q = quick_xml::writer::Writer::new(&mut buffer);
        let ns_to_apply = vec![("xmlns:D".into(), DAV_NS.into())];
        let mut writer = Writer { q, ns_to_apply };

        let decl = BytesDecl::from_start(BytesStart::from_content(
            "xml version=\"1.0\" encoding=\"utf-8\"",
            0,
        ));
        writer.q.write_event_async(Event::Decl(decl)).await?;
        elem.qwrite(&mut writer).await?;
    }

    Ok(buffer)
}

// ---- ROOT ----

impl QWrite for PropFind {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("propfind");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        match self {
            Self::PropName => {
                let empty_tag = xml.create_dav_element("propname");
                xml.q.write_event_async(Event::Empty(empty_tag)).await?
            }
            Self::AllProp => {
                let empty_tag = xml.create_dav_element("allprop");
                xml.q.write_event_async(Event::Empty(empty_tag)).await?
            }
            Self::Prop(names) => {
                let start = xml.create_dav_element("prop");
                let end = start.to_end();
                xml.q.write_event_async(Event::Start(start.clone())).await?;
                for name in names.iter() {
                    name.qwrite(xml).await?;
                }
                xml.q.write_event_async(Event::End(end)).await?
            }
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for PropertyUpdate {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("propertyupdate");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        for update in self.0.iter() {
            update.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockInfo {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("lockinfo");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.lockscope.qwrite(xml).await?;
        self.locktype.qwrite(xml).await?;
        if let Some(owner) = &self.owner {
            owner.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

// ---- INNER XML ----

impl QWrite for PropertyUpdateItem {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let (name, prop) = match self {
            Self::Set(prop) => ("set", prop.clone()),
            Self::Remove(prop) => ("remove", Prop::from_names(&prop.names())),
        };
        let start = xml.create_dav_element(name);
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        prop.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Prop {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("prop");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        text_field(xml, "creationdate", &self.creationdate, |v| v.to_rfc3339()).await?;
        text_field(xml, "displayname", &self.displayname, String::clone).await?;
        text_field(xml, "getcontentlanguage", &self.getcontentlanguage, String::clone).await?;
        text_field(xml, "getcontentlength", &self.getcontentlength, u64::to_string).await?;
        text_field(xml, "getcontenttype", &self.getcontenttype, String::clone).await?;
        text_field(xml, "getetag", &self.getetag, String::clone).await?;
        text_field(xml, "getlastmodified", &self.getlastmodified, rfc1123).await?;
        text_field(xml, "iscollection", &self.iscollection, |v| {
            if *v { "1".into() } else { "0".into() }
        })
        .await?;
        list_field(xml, "lockdiscovery", &self.lockdiscovery).await?;
        list_field(xml, "resourcetype", &self.resourcetype).await?;
        list_field(xml, "supportedlock", &self.supportedlock).await?;
        for dead in self.dead.iter() {
            dead.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

fn rfc1123(date: &DateTime<FixedOffset>) -> String {
    date.with_timezone(&Utc)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

async fn text_element(
    xml: &mut Writer<impl IWrite>,
    name: &str,
    txt: &str,
) -> Result<(), quick_xml::Error> {
    let start = xml.create_dav_element(name);
    let end = start.to_end();

    xml.q.write_event_async(Event::Start(start.clone())).await?;
    xml.q
        .write_event_async(Event::Text(BytesText::new(txt)))
        .await?;
    xml.q.write_event_async(Event::End(end)).await
}

async fn text_field<T: Sync>(
    xml: &mut Writer<impl IWrite>,
    name: &str,
    field: &Option<Field<T>>,
    render: fn(&T) -> String,
) -> Result<(), quick_xml::Error> {
    match field {
        None => Ok(()),
        Some(Field::NameOnly) => {
            let empty_tag = xml.create_dav_element(name);
            xml.q.write_event_async(Event::Empty(empty_tag)).await
        }
        Some(Field::Value(v)) => text_element(xml, name, &render(v)).await,
    }
}

async fn list_field<T: QWrite + Sync>(
    xml: &mut Writer<impl IWrite>,
    name: &str,
    field: &Option<Field<Vec<T>>>,
) -> Result<(), quick_xml::Error> {
    match field {
        None => Ok(()),
        Some(Field::NameOnly) => {
            let empty_tag = xml.create_dav_element(name);
            xml.q.write_event_async(Event::Empty(empty_tag)).await
        }
        Some(Field::Value(list)) => {
            let start = xml.create_dav_element(name);
            let end = start.to_end();
            xml.q.write_event_async(Event::Start(start.clone())).await?;
            for item in list.iter() {
                item.qwrite(xml).await?;
            }
            xml.q.write_event_async(Event::End(end)).await
        }
    }
}

impl QWrite for DeadProperty {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_foreign_element(&self.name.ns, &self.name.local);
        match &self.value {
            Field::NameOnly => xml.q.write_event_async(Event::Empty(start)).await,
            Field::Value(raw) => {
                let end = start.to_end();
                xml.q.write_event_async(Event::Start(start.clone())).await?;
                xml.q
                    .write_event_async(Event::Text(BytesText::from_escaped(raw.as_str())))
                    .await?;
                xml.q.write_event_async(Event::End(end)).await
            }
        }
    }
}

impl QWrite for PropertyName {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let empty_tag = match self {
            Self::CreationDate => xml.create_dav_element("creationdate"),
            Self::DisplayName => xml.create_dav_element("displayname"),
            Self::GetContentLanguage => xml.create_dav_element("getcontentlanguage"),
            Self::GetContentLength => xml.create_dav_element("getcontentlength"),
            Self::GetContentType => xml.create_dav_element("getcontenttype"),
            Self::GetEtag => xml.create_dav_element("getetag"),
            Self::GetLastModified => xml.create_dav_element("getlastmodified"),
            Self::IsCollection => xml.create_dav_element("iscollection"),
            Self::LockDiscovery => xml.create_dav_element("lockdiscovery"),
            Self::ResourceType => xml.create_dav_element("resourcetype"),
            Self::SupportedLock => xml.create_dav_element("supportedlock"),
            Self::Dead(name) => xml.create_foreign_element(&name.ns, &name.local),
        };
        xml.q.write_event_async(Event::Empty(empty_tag)).await
    }
}

impl QWrite for ResourceType {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let empty_tag = match self {
            Self::Collection => xml.create_dav_element("collection"),
            Self::Other(name) => xml.create_foreign_element(&name.ns, &name.local),
        };
        xml.q.write_event_async(Event::Empty(empty_tag)).await
    }
}

impl QWrite for ActiveLock {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        // <D:activelock>
        //   <D:locktype><D:write/></D:locktype>
        //   <D:lockscope><D:exclusive/></D:lockscope>
        //   <D:depth>infinity</D:depth>
        //   <D:owner>...</D:owner>
        //   <D:timeout>Second-604800</D:timeout>
        //   <D:locktoken>...</D:locktoken>
        //   <D:lockroot>...</D:lockroot>
        // </D:activelock>
        let start = xml.create_dav_element("activelock");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.locktype.qwrite(xml).await?;
        self.lockscope.qwrite(xml).await?;
        self.depth.qwrite(xml).await?;
        if let Some(owner) = &self.owner {
            owner.qwrite(xml).await?;
        }
        if let Some(timeout) = &self.timeout {
            timeout.qwrite(xml).await?;
        }
        if let Some(locktoken) = &self.locktoken {
            locktoken.qwrite(xml).await?;
        }
        if let Some(lockroot) = &self.lockroot {
            lockroot.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockEntry {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("lockentry");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.lockscope.qwrite(xml).await?;
        self.locktype.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockScope {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("lockscope");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        let empty_tag = match self {
            Self::Exclusive => xml.create_dav_element("exclusive"),
            Self::Shared => xml.create_dav_element("shared"),
        };
        xml.q.write_event_async(Event::Empty(empty_tag)).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockType {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("locktype");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        let empty_tag = match self {
            Self::Write => xml.create_dav_element("write"),
        };
        xml.q.write_event_async(Event::Empty(empty_tag)).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Owner {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        match self {
            Self::Txt(txt) => text_element(xml, "owner", txt).await,
            Self::Href(href) => {
                let start = xml.create_dav_element("owner");
                let end = start.to_end();
                xml.q.write_event_async(Event::Start(start.clone())).await?;
                href.qwrite(xml).await?;
                xml.q.write_event_async(Event::End(end)).await
            }
            Self::Unknown => {
                let empty_tag = xml.create_dav_element("owner");
                xml.q.write_event_async(Event::Empty(empty_tag)).await
            }
        }
    }
}

impl QWrite for Depth {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let txt = match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        };
        text_element(xml, "depth", txt).await
    }
}

impl QWrite for Timeout {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let txt = match self {
            Self::Seconds(count) => format!("Second-{}", count),
            Self::Infinite => "Infinite".into(),
        };
        text_element(xml, "timeout", &txt).await
    }
}

impl QWrite for LockToken {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("locktoken");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.0.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockRoot {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_dav_element("lockroot");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.0.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Href {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error> {
        text_element(xml, "href", &self.0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn render(elem: &(impl QWrite + Sync)) -> String {
        let buffer = serialize(elem).await.expect("xml serialization");
        String::from_utf8(buffer).expect("utf-8 output")
    }

    #[tokio::test]
    async fn propfind_allprop() {
        let got = render(&PropFind::AllProp).await;
        assert_eq!(
            got,
            r#"<?xml version="1.0" encoding="utf-8"?><D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#
        );
    }

    #[tokio::test]
    async fn propfind_propname() {
        let got = render(&PropFind::PropName).await;
        assert_eq!(
            got,
            r#"<?xml version="1.0" encoding="utf-8"?><D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#
        );
    }

    #[tokio::test]
    async fn propfind_named_with_foreign_property() {
        let req = PropFind::Prop(vec![
            PropertyName::DisplayName,
            PropertyName::GetContentLength,
            PropertyName::Dead(QualifiedName::new("http://example.com/ns/", "color")),
        ]);
        let got = render(&req).await;
        assert_eq!(
            got,
            r#"<?xml version="1.0" encoding="utf-8"?><D:propfind xmlns:D="DAV:"><D:prop><D:displayname/><D:getcontentlength/><color xmlns="http://example.com/ns/"/></D:prop></D:propfind>"#
        );
    }

    #[tokio::test]
    async fn propertyupdate_keeps_order_and_drops_removed_values() {
        let set = Prop {
            displayname: Some(Field::Value("Quarterly & annual".into())),
            dead: vec![DeadProperty::text("http://example.com/ns/", "color", "red")],
            ..Prop::default()
        };
        let remove = Prop {
            displayname: Some(Field::Value("ignored".into())),
            ..Prop::default()
        };
        let req = PropertyUpdate(vec![
            PropertyUpdateItem::Set(set),
            PropertyUpdateItem::Remove(remove),
        ]);

        let got = render(&req).await;
        let expected = r#"<?xml version="1.0" encoding="utf-8"?><D:propertyupdate xmlns:D="DAV:"><D:set><D:prop><D:displayname>Quarterly &amp; annual</D:displayname><color xmlns="http://example.com/ns/">red</color></D:prop></D:set><D:remove><D:prop><D:displayname/></D:prop></D:remove></D:propertyupdate>"#;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn lockinfo_scope_type_owner() {
        let req = LockInfo {
            lockscope: LockScope::Exclusive,
            locktype: LockType::Write,
            owner: Some(Owner::Href(Href("http://example.org/~ejw/contact.html".into()))),
        };

        let got = render(&req).await;
        let expected = r#"<?xml version="1.0" encoding="utf-8"?><D:lockinfo xmlns:D="DAV:"><D:lockscope><D:exclusive/></D:lockscope><D:locktype><D:write/></D:locktype><D:owner><D:href>http://example.org/~ejw/contact.html</D:href></D:owner></D:lockinfo>"#;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn lockinfo_without_owner() {
        let req = LockInfo {
            lockscope: LockScope::Shared,
            locktype: LockType::Write,
            owner: None,
        };

        let got = render(&req).await;
        let expected = r#"<?xml version="1.0" encoding="utf-8"?><D:lockinfo xmlns:D="DAV:"><D:lockscope><D:shared/></D:lockscope><D:locktype><D:write/></D:locktype></D:lockinfo>"#;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn dates_use_their_wire_formats() {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2017, 4, 8, 10, 7, 38)
            .unwrap();
        let req = PropertyUpdate(vec![PropertyUpdateItem::Set(Prop {
            creationdate: Some(Field::Value(date)),
            getlastmodified: Some(Field::Value(date)),
            ..Prop::default()
        })]);

        let got = render(&req).await;
        assert!(got.contains("<D:creationdate>2017-04-08T10:07:38+00:00</D:creationdate>"));
        assert!(got.contains("<D:getlastmodified>Sat, 08 Apr 2017 10:07:38 GMT</D:getlastmodified>"));
    }
}
