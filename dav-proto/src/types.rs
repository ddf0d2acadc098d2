//! In-memory representation of the WebDAV XML vocabulary (RFC 4918 §14)
//! as exchanged by a client: request bodies it writes (propfind,
//! propertyupdate, lockinfo) and response bodies it reads (multistatus,
//! prop, activelock, error).
use chrono::{DateTime, FixedOffset};

/// 14.7.  href XML Element
///
/// Name:   href
///
/// Purpose:   MUST contain a URI or a relative reference.
///
/// <!ELEMENT href (#PCDATA)>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Href(pub String);

/// 14.4.  depth XML Element
///
/// Value:   "0" | "1" | "infinity"
///
/// <!ELEMENT depth (#PCDATA)>
///
/// The same three values are used by the Depth header. Whether a verb
/// accepts a given depth is decided when the header is built, not here.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

/// 14.29.  timeout XML Element
///
/// Value:   TimeType (defined in Section 10.7)
///
/// <!ELEMENT timeout (#PCDATA) >
///
/// TimeOut = "Timeout" ":" 1#TimeType
/// TimeType = ("Second-" DAVTimeOutVal | "Infinite")
/// DAVTimeOutVal = 1*DIGIT
///
/// The timeout value for TimeType "Second" MUST NOT be greater than 2^32-1.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Timeout {
    Seconds(u32),
    Infinite,
}

/// 14.13.  lockscope XML Element
///
/// <!ELEMENT lockscope (exclusive | shared) >
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// 14.15.  locktype XML Element
///
/// <!ELEMENT locktype (write) >
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockType {
    Write,
}

/// 14.17.  owner XML Element
///
/// Purpose:   Holds client-supplied information about the creator of a
///    lock.
///
/// <!ELEMENT owner ANY >
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Owner {
    Txt(String),
    Href(Href),
    Unknown,
}

/// 14.13.  lockinfo XML Element
///
/// Purpose:   The 'lockinfo' XML element is used with a LOCK method to
///    specify the type of lock the client wishes to have created.
///
/// <!ELEMENT lockinfo (lockscope, locktype, owner?)  >
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LockInfo {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub owner: Option<Owner>,
}

/// 14.14.  locktoken XML Element
///
/// Purpose:   The lock token associated with a lock.
///
/// <!ELEMENT locktoken (href) >
///
/// The token is an opaque URI (usually `opaquelocktoken:...` or
/// `urn:uuid:...`) owned by the caller once LOCK returned it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LockToken(pub Href);
impl LockToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Href(token.into()))
    }
    pub fn as_str(&self) -> &str {
        self.0 .0.as_str()
    }
}

/// 14.12.  lockroot XML Element
///
/// <!ELEMENT lockroot (href) >
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LockRoot(pub Href);

/// 14.1.  activelock XML Element
///
/// Purpose:   Describes a lock on a resource.
/// <!ELEMENT activelock (lockscope, locktype, depth, owner?, timeout?,
///           locktoken?, lockroot)>
///
/// `lockroot` was introduced by RFC 4918, RFC 2518 servers omit it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ActiveLock {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub depth: Depth,
    pub owner: Option<Owner>,
    pub timeout: Option<Timeout>,
    pub locktoken: Option<LockToken>,
    pub lockroot: Option<LockRoot>,
}

/// 14.10.  lockentry XML Element
///
/// <!ELEMENT lockentry (lockscope, locktype) >
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LockEntry {
    pub lockscope: LockScope,
    pub locktype: LockType,
}

/// An XML element name resolved against its namespace,
/// eg. `("http://ns.example.com/boxschema/", "author")`.
#[derive(Debug, PartialEq, Eq, Clone, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub ns: String,
    pub local: String,
}
impl QualifiedName {
    pub fn new(ns: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            ns: ns.into(),
            local: local.into(),
        }
    }
}

/// A property slot inside a `prop` bag.
///
/// `NameOnly` is an element present without any content, as returned by
/// PROPFIND propname, or echoed back to confirm a PROPPATCH remove. It is
/// not the same thing as the property being absent from the bag.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Field<T> {
    NameOnly,
    Value(T),
}
impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::NameOnly => None,
        }
    }
}

/// 15.9.  resourcetype Property
///
/// <!ELEMENT resourcetype ANY >
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ResourceType {
    Collection,
    Other(QualifiedName),
}

/// A property the client has no typed field for, kept as found on the
/// wire. `value` holds the inner XML of the element, escaped as it was
/// received, so it can be written back untouched.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DeadProperty {
    pub name: QualifiedName,
    pub value: Field<String>,
}
impl DeadProperty {
    /// A dead property holding plain text, escaped for the wire.
    pub fn text(ns: &str, local: &str, text: &str) -> Self {
        Self {
            name: QualifiedName::new(ns, local),
            value: Field::Value(quick_xml::escape::escape(text).into_owned()),
        }
    }
}

/// 14.18.  prop XML Element
///
/// Purpose:   Contains properties related to a resource.
///
/// <!ELEMENT prop ANY >
///
/// The live properties of RFC 4918 §15 (and the widespread
/// `iscollection`) get a typed field, everything else lands in `dead`
/// in document order.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Prop {
    /// 15.1 creationdate, RFC 3339
    pub creationdate: Option<Field<DateTime<FixedOffset>>>,
    /// 15.2 displayname
    pub displayname: Option<Field<String>>,
    /// 15.3 getcontentlanguage
    pub getcontentlanguage: Option<Field<String>>,
    /// 15.4 getcontentlength
    pub getcontentlength: Option<Field<u64>>,
    /// 15.5 getcontenttype
    pub getcontenttype: Option<Field<String>>,
    /// 15.6 getetag
    pub getetag: Option<Field<String>>,
    /// 15.7 getlastmodified, RFC 1123
    pub getlastmodified: Option<Field<DateTime<FixedOffset>>>,
    /// IIS style `0` / `1` collection marker
    pub iscollection: Option<Field<bool>>,
    /// 15.8 lockdiscovery
    pub lockdiscovery: Option<Field<Vec<ActiveLock>>>,
    /// 15.9 resourcetype
    pub resourcetype: Option<Field<Vec<ResourceType>>>,
    /// 15.10 supportedlock
    pub supportedlock: Option<Field<Vec<LockEntry>>>,
    pub dead: Vec<DeadProperty>,
}
impl Prop {
    /// A bag with every requested name marked present but empty,
    /// the shape expected inside a PROPPATCH `remove`.
    pub fn from_names(names: &[PropertyName]) -> Self {
        let mut prop = Prop::default();
        for name in names {
            match name {
                PropertyName::CreationDate => prop.creationdate = Some(Field::NameOnly),
                PropertyName::DisplayName => prop.displayname = Some(Field::NameOnly),
                PropertyName::GetContentLanguage => {
                    prop.getcontentlanguage = Some(Field::NameOnly)
                }
                PropertyName::GetContentLength => prop.getcontentlength = Some(Field::NameOnly),
                PropertyName::GetContentType => prop.getcontenttype = Some(Field::NameOnly),
                PropertyName::GetEtag => prop.getetag = Some(Field::NameOnly),
                PropertyName::GetLastModified => prop.getlastmodified = Some(Field::NameOnly),
                PropertyName::IsCollection => prop.iscollection = Some(Field::NameOnly),
                PropertyName::LockDiscovery => prop.lockdiscovery = Some(Field::NameOnly),
                PropertyName::ResourceType => prop.resourcetype = Some(Field::NameOnly),
                PropertyName::SupportedLock => prop.supportedlock = Some(Field::NameOnly),
                PropertyName::Dead(name) => prop.dead.push(DeadProperty {
                    name: name.clone(),
                    value: Field::NameOnly,
                }),
            }
        }
        prop
    }

    /// Names of every property present in the bag, values or not.
    pub fn names(&self) -> Vec<PropertyName> {
        let mut acc = vec![];
        macro_rules! present {
            ($field:ident, $name:expr) => {
                if self.$field.is_some() {
                    acc.push($name);
                }
            };
        }
        present!(creationdate, PropertyName::CreationDate);
        present!(displayname, PropertyName::DisplayName);
        present!(getcontentlanguage, PropertyName::GetContentLanguage);
        present!(getcontentlength, PropertyName::GetContentLength);
        present!(getcontenttype, PropertyName::GetContentType);
        present!(getetag, PropertyName::GetEtag);
        present!(getlastmodified, PropertyName::GetLastModified);
        present!(iscollection, PropertyName::IsCollection);
        present!(lockdiscovery, PropertyName::LockDiscovery);
        present!(resourcetype, PropertyName::ResourceType);
        present!(supportedlock, PropertyName::SupportedLock);
        acc.extend(self.dead.iter().map(|d| PropertyName::Dead(d.name.clone())));
        acc
    }

    pub fn displayname(&self) -> Option<&str> {
        self.displayname
            .as_ref()
            .and_then(Field::value)
            .map(String::as_str)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.getcontentlength.as_ref().and_then(Field::value).copied()
    }

    pub fn last_modified(&self) -> Option<DateTime<FixedOffset>> {
        self.getlastmodified.as_ref().and_then(Field::value).copied()
    }

    pub fn etag(&self) -> Option<&str> {
        self.getetag.as_ref().and_then(Field::value).map(String::as_str)
    }

    /// A resource is a collection if its resourcetype says so, or if the
    /// server only exposes the `iscollection` flag.
    pub fn is_collection(&self) -> bool {
        let by_type = matches!(
            self.resourcetype.as_ref().and_then(Field::value),
            Some(v) if v.contains(&ResourceType::Collection)
        );
        by_type || matches!(self.iscollection, Some(Field::Value(true)))
    }

    pub fn dead(&self, ns: &str, local: &str) -> Option<&DeadProperty> {
        self.dead
            .iter()
            .find(|d| d.name.ns == ns && d.name.local == local)
    }

    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }
}

/// The name of a property, as requested inside `<prop>` by PROPFIND.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PropertyName {
    CreationDate,
    DisplayName,
    GetContentLanguage,
    GetContentLength,
    GetContentType,
    GetEtag,
    GetLastModified,
    IsCollection,
    LockDiscovery,
    ResourceType,
    SupportedLock,
    Dead(QualifiedName),
}

/// 14.20.  propfind XML Element
///
/// Purpose:   Specifies the properties to be returned from a PROPFIND
///    method.
///
/// <!ELEMENT propfind ( propname | (allprop, include?) | prop ) >
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PropFind {
    PropName,
    AllProp,
    Prop(Vec<PropertyName>),
}
impl PropFind {
    /// A named request must name at least one property.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Prop(names) if names.is_empty())
    }
}

/// 14.19.  propertyupdate XML Element
///
/// Purpose:   Contains a request to alter the properties on a resource.
///
/// <!ELEMENT propertyupdate (remove | set)+ >
///
/// Instructions are applied by the server in document order.
#[derive(Debug, PartialEq, Clone)]
pub struct PropertyUpdate(pub Vec<PropertyUpdateItem>);

/// 14.23 remove / 14.26 set
///
/// Values held by a `Remove` bag are ignored when serializing.
#[derive(Debug, PartialEq, Clone)]
pub enum PropertyUpdateItem {
    Set(Prop),
    Remove(Prop),
}

/// 14.28.  status XML Element
///
/// <!ELEMENT status (#PCDATA) >
///
/// Value:   status-line (defined in Section 6.1 of [RFC2616])
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Status(pub http::status::StatusCode);
impl Status {
    pub fn is_success(&self) -> bool {
        self.0.is_success()
    }
}

/// 14.25.  responsedescription XML Element
///
/// <!ELEMENT responsedescription (#PCDATA) >
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ResponseDescription(pub String);

/// 14.9.  location XML Element
///
/// <!ELEMENT location (href)>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Location(pub Href);

/// 14.22 propstat XML Element
///
/// <!ELEMENT propstat (prop, status, error?, responsedescription?) >
#[derive(Debug, PartialEq, Clone)]
pub struct PropStat {
    pub prop: Prop,
    pub status: Status,
    pub error: Option<Error>,
    pub responsedescription: Option<ResponseDescription>,
}

/// Either the whole resource has a status, or its properties are split
/// across several propstat.
#[derive(Debug, PartialEq, Clone)]
pub enum StatusOrPropstat {
    Status(Status),
    PropStat(Vec<PropStat>),
}

/// 14.24.  response XML Element
///
/// <!ELEMENT response (href, ((href*, status)|(propstat+)),
///                     error?, responsedescription? , location?) >
///
/// Several `href` are kept in order for multi-bound resources.
#[derive(Debug, PartialEq, Clone)]
pub struct Response {
    pub hrefs: Vec<Href>,
    pub status_or_propstat: StatusOrPropstat,
    pub error: Option<Error>,
    pub responsedescription: Option<ResponseDescription>,
    pub location: Option<Location>,
}
impl Response {
    pub fn href(&self) -> &str {
        self.hrefs.first().map(|h| h.0.as_str()).unwrap_or_default()
    }

    /// The prop bag of the first successful propstat, if any.
    pub fn ok_prop(&self) -> Option<&Prop> {
        match &self.status_or_propstat {
            StatusOrPropstat::PropStat(list) => list
                .iter()
                .find(|ps| ps.status.is_success())
                .map(|ps| &ps.prop),
            StatusOrPropstat::Status(_) => None,
        }
    }

    /// Every property found in any propstat, whatever its status.
    pub fn props(&self) -> impl Iterator<Item = (&Status, &Prop)> {
        let list: &[PropStat] = match &self.status_or_propstat {
            StatusOrPropstat::PropStat(list) => list.as_slice(),
            StatusOrPropstat::Status(_) => &[],
        };
        list.iter().map(|ps| (&ps.status, &ps.prop))
    }
}

/// 14.16.  multistatus XML Element
///
/// <!ELEMENT multistatus (response*, responsedescription?)  >
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Multistatus {
    pub responses: Vec<Response>,
    pub responsedescription: Option<ResponseDescription>,
}
impl Multistatus {
    pub fn find(&self, href: &str) -> Option<&Response> {
        self.responses
            .iter()
            .find(|r| r.hrefs.iter().any(|h| h.0 == href))
    }

    /// Every (href, status) pair that is not a 2xx, at the resource level
    /// or at the propstat level, in document order.
    pub fn failures(&self) -> Vec<(&Href, Status)> {
        let mut acc = vec![];
        for resp in self.responses.iter() {
            let Some(href) = resp.hrefs.first() else {
                continue;
            };
            match &resp.status_or_propstat {
                StatusOrPropstat::Status(st) if !st.is_success() => acc.push((href, *st)),
                StatusOrPropstat::Status(_) => (),
                StatusOrPropstat::PropStat(list) => acc.extend(
                    list.iter()
                        .filter(|ps| !ps.status.is_success())
                        .map(|ps| (href, ps.status)),
                ),
            }
        }
        acc
    }
}

/// 14.5.  error XML Element
///
/// Purpose:   Error responses, particularly 403 Forbidden and 409
///    Conflict, sometimes need more information to indicate what went
///    wrong.
///
/// <!ELEMENT error ANY >
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Error(pub Vec<Violation>);

/// 16.  Precondition/Postcondition XML Elements
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Violation {
    /// (DAV:lock-token-matches-request-uri)
    LockTokenMatchesRequestUri,
    /// (DAV:lock-token-submitted), with the locked root URLs
    LockTokenSubmitted(Vec<Href>),
    /// (DAV:no-conflicting-lock), with the conflicting lock roots
    NoConflictingLock(Vec<Href>),
    /// (DAV:no-external-entities)
    NoExternalEntities,
    /// (DAV:preserved-live-properties)
    PreservedLiveProperties,
    /// (DAV:propfind-finite-depth)
    PropfindFiniteDepth,
    /// (DAV:cannot-modify-protected-property)
    CannotModifyProtectedProperty,
    /// Any other condition, by name
    Other(QualifiedName),
}
