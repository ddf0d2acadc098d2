use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use super::error::UriError;

/// Everything but the unreserved characters of RFC 3986 is escaped
/// inside a path segment.
pub const RFC_3986: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// An absolute URI has both a scheme and an authority.
pub fn is_absolute(uri: &str) -> bool {
    matches!(uri.parse::<http::Uri>(), Ok(u) if u.scheme().is_some() && u.authority().is_some())
}

/// Starts with `scheme://`, whether or not the rest is a valid URI.
pub fn has_scheme(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Escape one path segment. Existing escapes are decoded first, so a
/// segment that is already encoded comes out unchanged.
pub fn encode_segment(segment: &str) -> String {
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    utf8_percent_encode(&decoded, RFC_3986).to_string()
}

/// Join `relative` under `base` with exactly one slash between them.
///
/// Slashes at the edges of both sides are irrelevant. A folder always
/// gets a single trailing slash, a file never has one.
pub fn combine(base: &str, relative: &str, is_folder: bool) -> Result<String, UriError> {
    if !is_absolute(base) {
        return Err(UriError(base.into()));
    }

    let mut out = base.trim_end_matches('/').to_string();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(&encode_segment(segment));
    }
    if is_folder {
        out.push('/');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_prefix() {
        assert!(has_scheme("http://localhost:8080/dav/my file.txt"));
        assert!(!is_absolute("http://localhost:8080/dav/my file.txt"));
        assert!(has_scheme("HTTPS://host/"));
        assert!(!has_scheme("folder/http://x"));
        assert!(!has_scheme("test.txt"));
        assert!(!has_scheme("/dav/test.txt"));
    }

    #[test]
    fn slash_insensitive() {
        let expected = "http://host/webdav/TestFolder/";
        assert_eq!(combine("http://host/webdav", "TestFolder", true).unwrap(), expected);
        assert_eq!(combine("http://host/webdav/", "/TestFolder", true).unwrap(), expected);
        assert_eq!(combine("http://host/webdav//", "//TestFolder//", true).unwrap(), expected);
        assert_eq!(
            combine("http://host/webdav/", "/TestFolder/", false).unwrap(),
            "http://host/webdav/TestFolder"
        );
    }

    #[test]
    fn nested_relative_path() {
        assert_eq!(
            combine("http://127.0.0.1/webdav", "test1/test1_1/file2.txt", false).unwrap(),
            "http://127.0.0.1/webdav/test1/test1_1/file2.txt"
        );
        assert_eq!(
            combine("http://127.0.0.1/webdav", "", true).unwrap(),
            "http://127.0.0.1/webdav/"
        );
    }

    #[test]
    fn reserved_characters_are_escaped_once() {
        let once = combine("http://host/dav", "my file #1?.txt", false).unwrap();
        assert_eq!(once, "http://host/dav/my%20file%20%231%3F.txt");

        let twice = combine("http://host/dav", "my%20file%20%231%3F.txt", false).unwrap();
        assert_eq!(twice, once);

        assert_eq!(encode_segment("100%"), "100%25");
        assert_eq!(encode_segment("100%25"), "100%25");
        assert_eq!(encode_segment("élan"), "%C3%A9lan");
    }

    #[test]
    fn malformed_base() {
        assert!(combine("/webdav", "TestFolder", true).is_err());
        assert!(combine("not a uri", "TestFolder", true).is_err());
        assert!(combine("", "TestFolder", false).is_err());
    }
}
