use chrono::DateTime;
use quick_xml::events::Event;
use quick_xml::reader::NsReader;

use super::error::ParsingError;
use super::types::*;
use super::xml::{IRead, QRead, Reader, DAV_URN};

/// Parse a complete response body, skipping whatever precedes the
/// expected root element (declaration, comments, whitespace).
pub async fn deserialize<T: QRead<T>>(src: &[u8]) -> Result<T, ParsingError> {
    let mut rdr = Reader::new(NsReader::from_reader(src)).await?;
    rdr.find::<T>().await
}

/// Text content of the element that was just opened, empty for a
/// self-closed element.
async fn text_content(xml: &mut Reader<impl IRead>) -> Result<String, ParsingError> {
    match xml.parent_has_child() {
        true => xml.tag_string().await,
        false => Ok(String::new()),
    }
}

// ---- ROOT ----

/// Generic response
impl QRead<Multistatus> for Multistatus {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "multistatus").await?;
        let mut responses = Vec::new();
        let mut responsedescription = None;

        while xml.parent_has_child() {
            let mut dirty = false;
            xml.maybe_push(&mut responses, &mut dirty).await?;
            xml.maybe_read(&mut responsedescription, &mut dirty).await?;
            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }

        xml.close().await?;
        if responses.is_empty() {
            return Err(ParsingError::MissingChild);
        }
        Ok(Multistatus {
            responses,
            responsedescription,
        })
    }
}

/// Error response
impl QRead<Error> for Error {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "error").await?;
        let violations = xml.collect::<Violation>().await?;
        xml.close().await?;
        Ok(Error(violations))
    }
}

// ---- INNER XML

impl QRead<Response> for Response {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "response").await?;
        let (mut status, mut error, mut responsedescription, mut location) =
            (None, None, None, None);
        let mut hrefs = Vec::new();
        let mut propstat = Vec::new();

        while xml.parent_has_child() {
            let mut dirty = false;
            xml.maybe_read::<Status>(&mut status, &mut dirty).await?;
            xml.maybe_push::<Href>(&mut hrefs, &mut dirty).await?;
            xml.maybe_push::<PropStat>(&mut propstat, &mut dirty)
                .await?;
            xml.maybe_read::<Error>(&mut error, &mut dirty).await?;
            xml.maybe_read::<ResponseDescription>(&mut responsedescription, &mut dirty)
                .await?;
            xml.maybe_read::<Location>(&mut location, &mut dirty)
                .await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }

        xml.close().await?;
        let status_or_propstat = match (status, propstat.is_empty(), hrefs.is_empty()) {
            (_, _, true) => return Err(ParsingError::MissingChild),
            (Some(status), true, false) => StatusOrPropstat::Status(status),
            (None, false, false) => StatusOrPropstat::PropStat(propstat),
            (Some(_), false, false) => return Err(ParsingError::InvalidValue),
            (None, true, false) => return Err(ParsingError::MissingChild),
        };
        Ok(Response {
            hrefs,
            status_or_propstat,
            error,
            responsedescription,
            location,
        })
    }
}

impl QRead<PropStat> for PropStat {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propstat").await?;

        let (mut m_prop, mut m_status, mut error, mut responsedescription) =
            (None, None, None, None);

        while xml.parent_has_child() {
            let mut dirty = false;
            xml.maybe_read::<Prop>(&mut m_prop, &mut dirty).await?;
            xml.maybe_read::<Status>(&mut m_status, &mut dirty).await?;
            xml.maybe_read::<Error>(&mut error, &mut dirty).await?;
            xml.maybe_read::<ResponseDescription>(&mut responsedescription, &mut dirty)
                .await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }

        xml.close().await?;
        match (m_prop, m_status) {
            (Some(prop), Some(status)) => Ok(PropStat {
                prop,
                status,
                error,
                responsedescription,
            }),
            _ => Err(ParsingError::MissingChild),
        }
    }
}

/// Only the 3-digit code matters, the protocol version and the reason
/// phrase are whatever the server felt like writing.
impl QRead<Status> for Status {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "status").await?;
        let fullcode = text_content(xml).await?;
        xml.close().await?;

        let txtcode = fullcode
            .split_whitespace()
            .find(|tok| tok.len() == 3 && tok.bytes().all(|b| b.is_ascii_digit()))
            .ok_or(ParsingError::InvalidValue)?;
        let code = http::status::StatusCode::from_bytes(txtcode.as_bytes())
            .or(Err(ParsingError::InvalidValue))?;
        Ok(Status(code))
    }
}

impl QRead<ResponseDescription> for ResponseDescription {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "responsedescription").await?;
        let cnt = text_content(xml).await?;
        xml.close().await?;
        Ok(ResponseDescription(cnt))
    }
}

impl QRead<Location> for Location {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "location").await?;
        let href = xml.find::<Href>().await?;
        xml.close().await?;
        Ok(Location(href))
    }
}

impl QRead<Violation> for Violation {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        if xml
            .maybe_open(DAV_URN, "lock-token-matches-request-uri")
            .await?
            .is_some()
        {
            xml.close().await?;
            Ok(Violation::LockTokenMatchesRequestUri)
        } else if xml
            .maybe_open(DAV_URN, "lock-token-submitted")
            .await?
            .is_some()
        {
            let links = xml.collect::<Href>().await?;
            xml.close().await?;
            Ok(Violation::LockTokenSubmitted(links))
        } else if xml
            .maybe_open(DAV_URN, "no-conflicting-lock")
            .await?
            .is_some()
        {
            let links = xml.collect::<Href>().await?;
            xml.close().await?;
            Ok(Violation::NoConflictingLock(links))
        } else if xml
            .maybe_open(DAV_URN, "no-external-entities")
            .await?
            .is_some()
        {
            xml.close().await?;
            Ok(Violation::NoExternalEntities)
        } else if xml
            .maybe_open(DAV_URN, "preserved-live-properties")
            .await?
            .is_some()
        {
            xml.close().await?;
            Ok(Violation::PreservedLiveProperties)
        } else if xml
            .maybe_open(DAV_URN, "propfind-finite-depth")
            .await?
            .is_some()
        {
            xml.close().await?;
            Ok(Violation::PropfindFiniteDepth)
        } else if xml
            .maybe_open(DAV_URN, "cannot-modify-protected-property")
            .await?
            .is_some()
        {
            xml.close().await?;
            Ok(Violation::CannotModifyProtectedProperty)
        } else {
            let (ns, local) = xml.peek_name().ok_or(ParsingError::Recoverable)?;
            xml.skip().await?;
            Ok(Violation::Other(QualifiedName { ns, local }))
        }
    }
}

/// The prop bag. Well-known DAV: properties are typed, anything else is
/// kept verbatim in `dead`. An element without content is recorded as
/// `Field::NameOnly`.
impl QRead<Prop> for Prop {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop").await?;
        let mut prop = Prop::default();

        while xml.parent_has_child() {
            let (ns, local) = match xml.peek() {
                Event::End(_) => break,
                Event::Start(_) | Event::Empty(_) => {
                    xml.peek_name().ok_or(ParsingError::WrongToken)?
                }
                _ => {
                    xml.skip().await?;
                    continue;
                }
            };

            if ns.as_bytes() != DAV_URN {
                prop.dead.push(dead_property(xml, ns, local).await?);
                continue;
            }

            match local.as_str() {
                "creationdate" => {
                    let field = text_field(xml, "creationdate").await?;
                    prop.creationdate = Some(parse_field(field, |v| {
                        DateTime::parse_from_rfc3339(v)
                    })?);
                }
                "displayname" => prop.displayname = Some(text_field(xml, "displayname").await?),
                "getcontentlanguage" => {
                    prop.getcontentlanguage = Some(text_field(xml, "getcontentlanguage").await?)
                }
                "getcontentlength" => {
                    let field = text_field(xml, "getcontentlength").await?;
                    prop.getcontentlength = Some(parse_field(field, str::parse::<u64>)?);
                }
                "getcontenttype" => {
                    prop.getcontenttype = Some(text_field(xml, "getcontenttype").await?)
                }
                "getetag" => prop.getetag = Some(text_field(xml, "getetag").await?),
                "getlastmodified" => {
                    let field = text_field(xml, "getlastmodified").await?;
                    prop.getlastmodified = Some(parse_field(field, |v| {
                        DateTime::parse_from_rfc2822(v)
                    })?);
                }
                "iscollection" => {
                    let field = text_field(xml, "iscollection").await?;
                    prop.iscollection = Some(parse_field(field, |v| match v {
                        "1" | "true" | "TRUE" => Ok(true),
                        "0" | "false" | "FALSE" => Ok(false),
                        _ => Err(ParsingError::InvalidValue),
                    })?);
                }
                "lockdiscovery" => {
                    xml.open(DAV_URN, "lockdiscovery").await?;
                    let acc = xml.collect::<ActiveLock>().await?;
                    xml.close().await?;
                    prop.lockdiscovery = Some(list_field(acc));
                }
                "resourcetype" => {
                    xml.open(DAV_URN, "resourcetype").await?;
                    let acc = xml.collect::<ResourceType>().await?;
                    xml.close().await?;
                    prop.resourcetype = Some(list_field(acc));
                }
                "supportedlock" => {
                    xml.open(DAV_URN, "supportedlock").await?;
                    let acc = xml.collect::<LockEntry>().await?;
                    xml.close().await?;
                    prop.supportedlock = Some(list_field(acc));
                }
                _ => prop.dead.push(dead_property(xml, ns, local).await?),
            }
        }

        xml.close().await?;
        Ok(prop)
    }
}

async fn text_field(
    xml: &mut Reader<impl IRead>,
    key: &str,
) -> Result<Field<String>, ParsingError> {
    xml.open(DAV_URN, key).await?;
    let txt = text_content(xml).await?;
    xml.close().await?;
    match txt.is_empty() {
        true => Ok(Field::NameOnly),
        false => Ok(Field::Value(txt)),
    }
}

fn parse_field<T, E>(
    field: Field<String>,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<Field<T>, ParsingError>
where
    ParsingError: From<E>,
{
    // a typed value cannot be blank
    match field {
        Field::Value(txt) if !txt.trim().is_empty() => Ok(Field::Value(parse(txt.trim())?)),
        _ => Ok(Field::NameOnly),
    }
}

fn list_field<T>(acc: Vec<T>) -> Field<Vec<T>> {
    match acc.is_empty() {
        true => Field::NameOnly,
        false => Field::Value(acc),
    }
}

async fn dead_property(
    xml: &mut Reader<impl IRead>,
    ns: String,
    local: String,
) -> Result<DeadProperty, ParsingError> {
    let raw = xml.raw_content().await?;
    let value = match raw.is_empty() {
        true => Field::NameOnly,
        false => Field::Value(raw),
    };
    Ok(DeadProperty {
        name: QualifiedName { ns, local },
        value,
    })
}

impl QRead<ResourceType> for ResourceType {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        if xml.maybe_open(DAV_URN, "collection").await?.is_some() {
            xml.close().await?;
            return Ok(ResourceType::Collection);
        }

        let (ns, local) = xml.peek_name().ok_or(ParsingError::Recoverable)?;
        xml.skip().await?;
        Ok(ResourceType::Other(QualifiedName { ns, local }))
    }
}

impl QRead<ActiveLock> for ActiveLock {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "activelock").await?;
        let (
            mut m_scope,
            mut m_type,
            mut m_depth,
            mut owner,
            mut timeout,
            mut locktoken,
            mut lockroot,
        ) = (None, None, None, None, None, None, None);

        while xml.parent_has_child() {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut m_scope, &mut dirty)
                .await?;
            xml.maybe_read::<LockType>(&mut m_type, &mut dirty).await?;
            xml.maybe_read::<Depth>(&mut m_depth, &mut dirty).await?;
            xml.maybe_read::<Owner>(&mut owner, &mut dirty).await?;
            xml.maybe_read::<Timeout>(&mut timeout, &mut dirty).await?;
            xml.maybe_read::<LockToken>(&mut locktoken, &mut dirty)
                .await?;
            xml.maybe_read::<LockRoot>(&mut lockroot, &mut dirty).await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                }
            }
        }

        xml.close().await?;
        match (m_scope, m_type, m_depth) {
            (Some(lockscope), Some(locktype), Some(depth)) => Ok(ActiveLock {
                lockscope,
                locktype,
                depth,
                owner,
                timeout,
                locktoken,
                lockroot,
            }),
            _ => Err(ParsingError::MissingChild),
        }
    }
}

impl QRead<Depth> for Depth {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "depth").await?;
        let depth_str = text_content(xml).await?;
        xml.close().await?;
        match depth_str.trim() {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            v if v.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
            _ => Err(ParsingError::WrongToken),
        }
    }
}

impl QRead<Owner> for Owner {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "owner").await?;

        let mut owner = Owner::Unknown;
        while xml.parent_has_child() {
            match xml.peek() {
                Event::Text(_) | Event::CData(_) => {
                    let txt = xml.tag_string().await?;
                    if matches!(owner, Owner::Unknown) && !txt.trim().is_empty() {
                        owner = Owner::Txt(txt.trim().to_string());
                    }
                }
                Event::Start(_) | Event::Empty(_) => match Href::qread(xml).await {
                    Ok(href) => {
                        owner = Owner::Href(href);
                    }
                    Err(ParsingError::Recoverable) => {
                        xml.skip().await?;
                    }
                    Err(e) => return Err(e),
                },
                Event::End(_) => break,
                _ => {
                    xml.skip().await?;
                }
            }
        }
        xml.close().await?;
        Ok(owner)
    }
}

impl QRead<Timeout> for Timeout {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        const SEC_PFX: &str = "Second-";
        xml.open(DAV_URN, "timeout").await?;
        let txt = text_content(xml).await?;
        xml.close().await?;

        match txt.trim() {
            "Infinite" => Ok(Timeout::Infinite),
            seconds => match seconds.strip_prefix(SEC_PFX) {
                Some(secs) => Ok(Timeout::Seconds(secs.parse::<u32>()?)),
                None => Err(ParsingError::InvalidValue),
            },
        }
    }
}

impl QRead<LockToken> for LockToken {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "locktoken").await?;
        let href = xml.find::<Href>().await?;
        xml.close().await?;
        Ok(LockToken(href))
    }
}

impl QRead<LockRoot> for LockRoot {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockroot").await?;
        let href = xml.find::<Href>().await?;
        xml.close().await?;
        Ok(LockRoot(href))
    }
}

impl QRead<LockEntry> for LockEntry {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockentry").await?;
        let (mut maybe_scope, mut maybe_type) = (None, None);

        while xml.parent_has_child() {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut maybe_scope, &mut dirty)
                .await?;
            xml.maybe_read::<LockType>(&mut maybe_type, &mut dirty)
                .await?;
            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }

        xml.close().await?;
        match (maybe_scope, maybe_type) {
            (Some(lockscope), Some(locktype)) => Ok(LockEntry {
                lockscope,
                locktype,
            }),
            _ => Err(ParsingError::MissingChild),
        }
    }
}

impl QRead<LockScope> for LockScope {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockscope").await?;
        if !xml.parent_has_child() {
            xml.close().await?;
            return Err(ParsingError::MissingChild);
        }

        let lockscope = loop {
            if xml.maybe_open(DAV_URN, "exclusive").await?.is_some() {
                xml.close().await?;
                break LockScope::Exclusive;
            }

            if xml.maybe_open(DAV_URN, "shared").await?.is_some() {
                xml.close().await?;
                break LockScope::Shared;
            }

            xml.skip().await?;
        };

        xml.close().await?;
        Ok(lockscope)
    }
}

impl QRead<LockType> for LockType {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "locktype").await?;
        if !xml.parent_has_child() {
            xml.close().await?;
            return Err(ParsingError::MissingChild);
        }

        let locktype = loop {
            if xml.maybe_open(DAV_URN, "write").await?.is_some() {
                xml.close().await?;
                break LockType::Write;
            }

            xml.skip().await?;
        };

        xml.close().await?;
        Ok(locktype)
    }
}

impl QRead<Href> for Href {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "href").await?;
        let url = text_content(xml).await?;
        xml.close().await?;
        Ok(Href(url.trim().to_string()))
    }
}
