use futures::Future;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use tokio::io::{AsyncBufRead, AsyncWrite};

use super::error::ParsingError;

pub const DAV_URN: &[u8] = b"DAV:";
pub const DAV_NS: &str = "DAV:";

/// Sinks and sources the codecs can be driven with.
pub trait IWrite: AsyncWrite + Unpin + Send {}
impl<T: AsyncWrite + Unpin + Send> IWrite for T {}
pub trait IRead: AsyncBufRead + Unpin {}
impl<T: AsyncBufRead + Unpin> IRead for T {}

pub trait QWrite {
    fn qwrite(
        &self,
        xml: &mut Writer<impl IWrite>,
    ) -> impl Future<Output = Result<(), quick_xml::Error>> + Send;
}
pub trait QRead<T> {
    fn qread(xml: &mut Reader<impl IRead>) -> impl Future<Output = Result<T, ParsingError>>;
}

/// Event writer plus the namespace declarations still to be put on
/// the next DAV element, ie. the root.
pub struct Writer<T: IWrite> {
    pub q: quick_xml::writer::Writer<T>,
    pub ns_to_apply: Vec<(String, String)>,
}
impl<T: IWrite> Writer<T> {
    pub fn create_dav_element(&mut self, name: &str) -> BytesStart<'static> {
        let mut start = BytesStart::new(format!("D:{}", name));
        if !self.ns_to_apply.is_empty() {
            start.extend_attributes(
                self.ns_to_apply
                    .iter()
                    .map(|(k, n)| (k.as_str(), n.as_str())),
            );
            self.ns_to_apply.clear()
        }
        start
    }

    /// An element outside of the DAV: namespace, declared inline as the
    /// default namespace so that no prefix has to be invented.
    pub fn create_foreign_element(&mut self, ns: &str, name: &str) -> BytesStart<'static> {
        let mut start = BytesStart::new(name.to_string());
        if !ns.is_empty() {
            start.push_attribute(("xmlns", ns));
        }
        start
    }
}

/// Pull reader with a one-event lookahead (`cur`) and the stack of
/// elements entered with `open`.
pub struct Reader<T: IRead> {
    pub rdr: NsReader<T>,
    cur: Event<'static>,
    parents: Vec<Event<'static>>,
    buf: Vec<u8>,
}
impl<T: IRead> Reader<T> {
    pub async fn new(mut rdr: NsReader<T>) -> Result<Self, ParsingError> {
        let mut buf: Vec<u8> = vec![];
        let cur = rdr.read_event_into_async(&mut buf).await?.into_owned();
        let parents = vec![];
        buf.clear();
        Ok(Self {
            cur,
            parents,
            rdr,
            buf,
        })
    }

    /// Advance by one event and hand back the one that was current.
    async fn next(&mut self) -> Result<Event<'static>, ParsingError> {
        let evt = self
            .rdr
            .read_event_into_async(&mut self.buf)
            .await?
            .into_owned();
        self.buf.clear();
        Ok(std::mem::replace(&mut self.cur, evt))
    }

    /// Step over the current event, or the whole sub-tree when it is a
    /// start tag.
    pub async fn skip(&mut self) -> Result<Event<'static>, ParsingError> {
        match &self.cur {
            Event::Start(b) => {
                let _span = self
                    .rdr
                    .read_to_end_into_async(b.to_end().name(), &mut self.buf)
                    .await?;
                self.next().await
            }
            Event::End(_) => Err(ParsingError::WrongToken),
            Event::Eof => Err(ParsingError::Eof),
            _ => self.next().await,
        }
    }

    fn is_tag(&self, ns: &[u8], key: &str) -> bool {
        let qname = match self.peek() {
            Event::Start(bs) | Event::Empty(bs) => bs.name(),
            Event::End(be) => be.name(),
            _ => return false,
        };

        let (extr_ns, local) = self.rdr.resolve_element(qname);

        if local.into_inner() != key.as_bytes() {
            return false;
        }

        match extr_ns {
            ResolveResult::Bound(v) => v.into_inner() == ns,
            _ => false,
        }
    }

    /// Namespace and local name of the element under the cursor.
    /// An unbound element gets an empty namespace.
    pub fn peek_name(&self) -> Option<(String, String)> {
        let qname = match self.peek() {
            Event::Start(bs) | Event::Empty(bs) => bs.name(),
            _ => return None,
        };
        let (extr_ns, local) = self.rdr.resolve_element(qname);
        let ns = match extr_ns {
            ResolveResult::Bound(v) => String::from_utf8_lossy(v.into_inner()).into_owned(),
            _ => String::new(),
        };
        Some((ns, String::from_utf8_lossy(local.into_inner()).into_owned()))
    }

    pub fn parent_has_child(&self) -> bool {
        matches!(self.parents.last(), Some(Event::Start(_)) | None)
    }

    fn ensure_parent_has_child(&self) -> Result<(), ParsingError> {
        match self.parent_has_child() {
            true => Ok(()),
            false => Err(ParsingError::Recoverable),
        }
    }

    pub fn peek(&self) -> &Event<'static> {
        &self.cur
    }

    pub async fn tag_string(&mut self) -> Result<String, ParsingError> {
        self.ensure_parent_has_child()?;

        let mut acc = String::new();
        loop {
            match self.peek() {
                Event::CData(unescaped) => {
                    acc.push_str(std::str::from_utf8(unescaped.as_ref())?);
                    self.next().await?
                }
                Event::Text(escaped) => {
                    acc.push_str(escaped.unescape()?.as_ref());
                    self.next().await?
                }
                Event::End(_) | Event::Start(_) | Event::Empty(_) => return Ok(acc),
                Event::Eof => return Err(ParsingError::Eof),
                _ => self.next().await?,
            };
        }
    }

    /// Consume the element under the cursor and return its inner content
    /// as it was written on the wire (children, text and entities untouched).
    /// A self-closed element yields an empty string.
    ///
    /// Prefixed children declared further up the document get their
    /// binding repeated on themselves, so the fragment stays well formed
    /// once it is written somewhere else.
    pub async fn raw_content(&mut self) -> Result<String, ParsingError> {
        match self.peek() {
            Event::Empty(_) => {
                self.next().await?;
                return Ok(String::new());
            }
            Event::Start(_) => {
                self.next().await?;
            }
            _ => return Err(ParsingError::Recoverable),
        };

        let mut out = quick_xml::writer::Writer::new(Vec::new());
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Event::Eof => return Err(ParsingError::Eof),
                Event::End(_) if depth == 0 => {
                    self.next().await?;
                    break;
                }
                Event::End(_) => depth -= 1,
                Event::Start(_) => depth += 1,
                _ => (),
            };
            let evt = match self.peek() {
                Event::Start(bs) => Event::Start(self.rebind(bs)),
                Event::Empty(bs) => Event::Empty(self.rebind(bs)),
                _ => self.cur.clone(),
            };
            self.next().await?;
            out.write_event(evt)?;
        }

        Ok(String::from_utf8(out.into_inner()).map_err(|e| e.utf8_error())?)
    }

    /// Copy of `start` carrying an `xmlns:<prefix>` declaration for every
    /// prefix used by its name or its attributes and not declared on it.
    fn rebind(&self, start: &BytesStart<'static>) -> BytesStart<'static> {
        let mut declared: Vec<Vec<u8>> = start
            .attributes()
            .flatten()
            .map(|a| a.key.into_inner().to_vec())
            .collect();

        let mut bindings = vec![];
        let name = start.name();
        if let (Some(p), (ResolveResult::Bound(ns), _)) =
            (name.prefix(), self.rdr.resolve_element(name))
        {
            bindings.push((p.into_inner().to_vec(), ns.into_inner().to_vec()));
        }
        for attr in start.attributes().flatten() {
            let Some(p) = attr.key.prefix() else {
                continue;
            };
            if matches!(p.into_inner(), b"xmlns" | b"xml") {
                continue;
            }
            if let (ResolveResult::Bound(ns), _) = self.rdr.resolve_attribute(attr.key) {
                bindings.push((p.into_inner().to_vec(), ns.into_inner().to_vec()));
            }
        }

        let mut out = start.clone();
        for (prefix, ns) in bindings {
            let decl = [b"xmlns:".as_slice(), prefix.as_slice()].concat();
            if !declared.contains(&decl) {
                out.push_attribute((decl.as_slice(), ns.as_slice()));
                declared.push(decl);
            }
        }
        out
    }

    /// Run a decoder on the cursor. `Recoverable` means "not this
    /// element" and maps to `None`, the cursor is left untouched then.
    async fn attempt<N: QRead<N>>(&mut self) -> Result<Option<N>, ParsingError> {
        match N::qread(self).await {
            Ok(v) => Ok(Some(v)),
            Err(ParsingError::Recoverable) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn maybe_read<N: QRead<N>>(
        &mut self,
        t: &mut Option<N>,
        dirty: &mut bool,
    ) -> Result<(), ParsingError> {
        if self.parent_has_child() {
            if let Some(v) = self.attempt::<N>().await? {
                *t = Some(v);
                *dirty = true;
            }
        }
        Ok(())
    }

    pub async fn maybe_push<N: QRead<N>>(
        &mut self,
        t: &mut Vec<N>,
        dirty: &mut bool,
    ) -> Result<(), ParsingError> {
        if self.parent_has_child() {
            if let Some(v) = self.attempt::<N>().await? {
                t.push(v);
                *dirty = true;
            }
        }
        Ok(())
    }

    /// First sibling that decodes as `N`, skipping the others.
    pub async fn maybe_find<N: QRead<N>>(&mut self) -> Result<Option<N>, ParsingError> {
        if !self.parent_has_child() {
            return Ok(None);
        }

        loop {
            if let Some(v) = self.attempt::<N>().await? {
                return Ok(Some(v));
            }
            match self.peek() {
                Event::End(_) | Event::Eof => return Ok(None),
                _ => self.skip().await?,
            };
        }
    }

    pub async fn find<N: QRead<N>>(&mut self) -> Result<N, ParsingError> {
        self.ensure_parent_has_child()?;
        self.maybe_find::<N>()
            .await?
            .ok_or(ParsingError::TagNotFound)
    }

    /// Every sibling that decodes as `N`, in document order.
    pub async fn collect<N: QRead<N>>(&mut self) -> Result<Vec<N>, ParsingError> {
        let mut acc = Vec::new();
        if !self.parent_has_child() {
            return Ok(acc);
        }

        loop {
            match self.attempt::<N>().await? {
                Some(v) => acc.push(v),
                None if matches!(self.peek(), Event::End(_)) => return Ok(acc),
                None => {
                    self.skip().await?;
                }
            }
        }
    }

    pub async fn open(&mut self, ns: &[u8], key: &str) -> Result<Event<'static>, ParsingError> {
        let evt = match self.peek() {
            // a self-closed tag is not consumed here, `close` will do it
            Event::Empty(_) if self.is_tag(ns, key) => self.cur.clone(),
            Event::Start(_) if self.is_tag(ns, key) => self.next().await?,
            _ => return Err(ParsingError::Recoverable),
        };

        self.parents.push(evt.clone());
        Ok(evt)
    }

    pub async fn maybe_open(
        &mut self,
        ns: &[u8],
        key: &str,
    ) -> Result<Option<Event<'static>>, ParsingError> {
        match self.open(ns, key).await {
            Ok(v) => Ok(Some(v)),
            Err(ParsingError::Recoverable) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Leave the element entered by `open`, skipping whatever is left
    /// of its children.
    pub async fn close(&mut self) -> Result<Event<'static>, ParsingError> {
        if !self.parent_has_child() {
            self.parents.pop();
            return self.next().await;
        }

        loop {
            match self.peek() {
                Event::End(_) => {
                    self.parents.pop();
                    return self.next().await;
                }
                _ => self.skip().await?,
            };
        }
    }
}
