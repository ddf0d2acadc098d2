mod common;

use http::{Method, StatusCode};

use common::{client, multistatus, Exchange, MockTransport};
use dav_client::dav::{
    Depth, Field, LockToken, Prop, PropFind, PropertyName, PropertyUpdate, PropertyUpdateItem,
    ResourceType, Violation,
};
use dav_client::{Cause, Error};
use dav_proto::headers::{LOCK, MKCOL, PROPFIND, PROPPATCH, UNLOCK};

const FILE: &str = "http://localhost:8080/dav/test.txt";
const CONTENT: &str = "This is a test file for WebDAV.";

const SET_DISPLAYNAME: &str = r#"<?xml version="1.0" encoding="utf-8"?><D:propertyupdate xmlns:D="DAV:"><D:set><D:prop><D:displayname>X</D:displayname></D:prop></D:set></D:propertyupdate>"#;
const REMOVE_DISPLAYNAME: &str = r#"<?xml version="1.0" encoding="utf-8"?><D:propertyupdate xmlns:D="DAV:"><D:remove><D:prop><D:displayname/></D:prop></D:remove></D:propertyupdate>"#;
const FIND_DISPLAYNAME: &str = r#"<?xml version="1.0" encoding="utf-8"?><D:propfind xmlns:D="DAV:"><D:prop><D:displayname/></D:prop></D:propfind>"#;

fn displayname(name: &str) -> Prop {
    Prop {
        displayname: Some(Field::Value(name.into())),
        ..Prop::default()
    }
}

#[tokio::test]
async fn put_proppatch_propfind_delete_scenario() {
    let set_reply = multistatus(
        r#"<D:response><D:href>/dav/test.txt</D:href><D:propstat><D:prop><D:displayname/></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>"#,
    );
    let find_reply = multistatus(
        r#"<D:response><D:href>/dav/test.txt</D:href><D:propstat><D:prop><D:displayname>X</D:displayname></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>"#,
    );
    let find_after_remove = multistatus(
        r#"<D:response><D:href>/dav/test.txt</D:href><D:propstat><D:prop><D:displayname/></D:prop><D:status>HTTP/1.1 404 Not Found</D:status></D:propstat></D:response>"#,
    );

    let transport = MockTransport::new(vec![
        Exchange::new(Method::PUT, FILE)
            .header("content-type", "text/plain")
            .body(CONTENT)
            .status(201),
        Exchange::new(PROPPATCH.clone(), FILE)
            .header("content-type", "application/xml; charset=\"utf-8\"")
            .body(SET_DISPLAYNAME)
            .status(207)
            .reply(set_reply.clone()),
        Exchange::new(PROPFIND.clone(), FILE)
            .header("depth", "0")
            .body(FIND_DISPLAYNAME)
            .status(207)
            .reply(find_reply),
        Exchange::new(PROPPATCH.clone(), FILE)
            .body(REMOVE_DISPLAYNAME)
            .status(207)
            .reply(set_reply),
        Exchange::new(PROPFIND.clone(), FILE)
            .header("depth", "0")
            .body(FIND_DISPLAYNAME)
            .status(207)
            .reply(find_after_remove),
        Exchange::new(Method::DELETE, FILE).status(204),
    ]);
    let dav = client(transport.clone());

    let put = dav.put("test.txt", CONTENT, Some("text/plain"), None).await.unwrap();
    assert_eq!(put.status, StatusCode::CREATED);

    let update = PropertyUpdate(vec![PropertyUpdateItem::Set(displayname("X"))]);
    let patched = dav.proppatch("test.txt", &update, None).await.unwrap();
    assert_eq!(patched.status, StatusCode::MULTI_STATUS);
    assert_eq!(patched.body.responses.len(), 1);
    assert!(patched.body.failures().is_empty());

    let query = PropFind::Prop(vec![PropertyName::DisplayName]);
    let found = dav.propfind("test.txt", Depth::Zero, &query).await.unwrap();
    let resp = found.body.find("/dav/test.txt").unwrap();
    assert_eq!(resp.ok_prop().and_then(Prop::displayname), Some("X"));

    let remove = PropertyUpdate(vec![PropertyUpdateItem::Remove(displayname("X"))]);
    dav.proppatch("test.txt", &remove, None).await.unwrap();

    let found = dav.propfind("test.txt", Depth::Zero, &query).await.unwrap();
    let resp = found.body.find("/dav/test.txt").unwrap();
    assert!(resp.ok_prop().is_none());
    let (status, prop) = resp.props().next().unwrap();
    assert_eq!(status.0, StatusCode::NOT_FOUND);
    assert_eq!(prop.displayname, Some(Field::NameOnly));

    let deleted = dav.delete("test.txt", None).await.unwrap();
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    assert_eq!(transport.remaining(), 0);
}

#[tokio::test]
async fn proppatch_no_content_is_an_empty_multistatus() {
    let transport = MockTransport::new(vec![
        Exchange::new(PROPPATCH.clone(), FILE).status(204)
    ]);
    let dav = client(transport);

    let update = PropertyUpdate(vec![PropertyUpdateItem::Set(displayname("X"))]);
    let resp = dav.proppatch(FILE, &update, None).await.unwrap();
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert!(resp.body.responses.is_empty());
}

#[tokio::test]
async fn propfind_allprop_depth_one() {
    let body = include_str!("fixtures/multistatus_allprop.xml");
    let transport = MockTransport::new(vec![Exchange::new(PROPFIND.clone(), "http://localhost:8080/dav")
        .header("depth", "1")
        .body(r#"<?xml version="1.0" encoding="utf-8"?><D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#)
        .status(207)
        .reply(body)]);
    let dav = client(transport);

    let listing = dav.propfind("", Depth::One, &PropFind::AllProp).await.unwrap();
    assert_eq!(listing.body.responses.len(), 6);

    let collections = listing
        .body
        .responses
        .iter()
        .filter(|r| r.ok_prop().map_or(false, Prop::is_collection))
        .count();
    assert!(collections >= 1);
    assert!(listing.body.responses[0]
        .ok_prop()
        .and_then(|p| p.resourcetype.as_ref())
        .and_then(Field::value)
        .map_or(false, |rt| rt.contains(&ResourceType::Collection)));
}

#[tokio::test]
async fn propfind_raw_body_is_sent_verbatim() {
    let raw = r#"<?xml version="1.0"?><propfind xmlns="DAV:"><prop><getetag/></prop></propfind>"#;
    let reply = multistatus(
        r#"<D:response><D:href>/dav/test.txt</D:href><D:propstat><D:prop><D:getetag>"abc"</D:getetag></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>"#,
    );
    let transport = MockTransport::new(vec![Exchange::new(PROPFIND.clone(), FILE)
        .header("depth", "0")
        .body(raw)
        .status(207)
        .reply(reply)]);
    let dav = client(transport);

    let resp = dav.propfind_raw("test.txt", Depth::Zero, raw).await.unwrap();
    let prop = resp.body.responses[0].ok_prop().unwrap();
    assert_eq!(prop.etag(), Some("\"abc\""));
}

#[tokio::test]
async fn empty_named_propfind_is_refused_locally() {
    let transport = MockTransport::new(vec![]);
    let dav = client(transport.clone());

    let err = dav
        .propfind("test.txt", Depth::Zero, &PropFind::Prop(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert!(transport.seen().is_empty());
}

#[tokio::test]
async fn unparseable_multistatus_is_a_parse_error() {
    let transport = MockTransport::new(vec![Exchange::new(PROPFIND.clone(), FILE)
        .status(207)
        .reply("<D:multistatus xmlns:D=\"DAV:\"><D:response>")]);
    let dav = client(transport);

    let err = dav
        .propfind("test.txt", Depth::Zero, &PropFind::AllProp)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

#[tokio::test]
async fn partial_failure_on_demand() {
    let reply = multistatus(
        r#"<D:response><D:href>/dav/test.txt</D:href><D:propstat><D:prop><D:displayname/></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat><D:propstat><D:prop><D:getetag/></D:prop><D:status>HTTP/1.1 403 Forbidden</D:status></D:propstat></D:response>"#,
    );
    let transport = MockTransport::new(vec![Exchange::new(PROPPATCH.clone(), FILE)
        .status(207)
        .reply(reply)]);
    let dav = client(transport);

    let update = PropertyUpdate(vec![PropertyUpdateItem::Set(displayname("X"))]);
    let resp = dav.proppatch("test.txt", &update, None).await.unwrap();
    assert_eq!(resp.body.failures().len(), 1);

    let err = resp.ensure_success().unwrap_err();
    let failure = err.failure().unwrap();
    assert!(matches!(failure.cause, Cause::PartialFailure(1)));
    assert_eq!(failure.status, Some(StatusCode::MULTI_STATUS));
    assert!(failure.multistatus.is_some());
}

#[tokio::test]
async fn mkcol_targets_a_folder() {
    let transport = MockTransport::new(vec![
        Exchange::new(MKCOL.clone(), "http://localhost:8080/dav/TestFolder/").status(201),
    ]);
    let dav = client(transport);

    let resp = dav.mkcol("TestFolder", None).await.unwrap();
    assert_eq!(resp.status, StatusCode::CREATED);
}

#[tokio::test]
async fn copy_and_move_headers() {
    let transport = MockTransport::new(vec![
        Exchange::new(Method::from_bytes(b"COPY").unwrap(), FILE)
            .header("destination", "http://localhost:8080/dav/copy%20of%20test.txt")
            .header("depth", "0")
            .header("overwrite", "F")
            .status(201),
        Exchange::new(Method::from_bytes(b"MOVE").unwrap(), FILE)
            .header("destination", "http://localhost:8080/dav/moved.txt")
            .header("depth", "infinity")
            .header("overwrite", "T")
            .header("if", "(<opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4>)")
            .status(201),
    ]);
    let dav = client(transport.clone());

    dav.copy_to("test.txt", "copy of test.txt", Depth::Zero, Some(false))
        .await
        .unwrap();

    let token = LockToken::new("opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4");
    dav.move_to("test.txt", "moved.txt", Some(true), Some(&token))
        .await
        .unwrap();

    assert_eq!(transport.remaining(), 0);
}

#[tokio::test]
async fn copy_with_depth_one_is_refused_locally() {
    let transport = MockTransport::new(vec![]);
    let dav = client(transport.clone());

    let err = dav
        .copy_to("test.txt", "other.txt", Depth::One, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HeaderFormat(_)));
    assert!(transport.seen().is_empty());
}

#[tokio::test]
async fn get_and_head() {
    let transport = MockTransport::new(vec![
        Exchange::new(Method::GET, FILE).reply(CONTENT),
        Exchange::new(Method::HEAD, FILE).reply_header("content-length", "31"),
    ]);
    let dav = client(transport);

    let got = dav.get("test.txt").await.unwrap();
    assert_eq!(&got.body[..], CONTENT.as_bytes());

    let head = dav.head("test.txt").await.unwrap();
    assert_eq!(head.headers.get("content-length").unwrap(), "31");
}

#[tokio::test]
async fn trailing_slash_addresses_a_collection() {
    let transport = MockTransport::new(vec![
        Exchange::new(PROPFIND.clone(), "http://localhost:8080/dav/test1/")
            .status(207)
            .reply(multistatus(
                r#"<D:response><D:href>/dav/test1/</D:href><D:status>HTTP/1.1 200 OK</D:status></D:response>"#,
            )),
        Exchange::new(Method::DELETE, "http://localhost:8080/dav/test1/").status(204),
        Exchange::new(Method::from_bytes(b"COPY").unwrap(), "http://localhost:8080/dav/TestFolder/")
            .header("destination", "http://localhost:8080/dav/TestFolder2/")
            .header("depth", "infinity")
            .status(201),
        Exchange::new(Method::DELETE, "http://localhost:8080/dav/test.txt").status(204),
    ]);
    let dav = client(transport.clone());

    dav.propfind("test1/", Depth::Zero, &PropFind::AllProp)
        .await
        .unwrap();
    dav.delete("test1/", None).await.unwrap();
    dav.copy_to("TestFolder/", "TestFolder2/", Depth::Infinity, None)
        .await
        .unwrap();
    dav.delete("test.txt", None).await.unwrap();

    let uris: Vec<_> = transport.seen().into_iter().map(|r| r.uri).collect();
    assert_eq!(
        uris,
        vec![
            "http://localhost:8080/dav/test1/",
            "http://localhost:8080/dav/test1/",
            "http://localhost:8080/dav/TestFolder/",
            "http://localhost:8080/dav/test.txt",
        ]
    );
    assert_eq!(transport.remaining(), 0);
}

#[tokio::test]
async fn malformed_absolute_target_is_not_joined_under_the_base() {
    let transport = MockTransport::new(vec![]);
    let dav = client(transport.clone());

    let err = dav
        .get("http://localhost:8080/dav/my file.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Uri(_)));

    let err = dav
        .copy_to("test.txt", "http://localhost:8080/dav/my copy.txt", Depth::Zero, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Uri(_)));
    assert!(transport.seen().is_empty());
}

#[tokio::test]
async fn absolute_target_is_used_as_is() {
    let transport = MockTransport::new(vec![
        Exchange::new(Method::GET, "http://other.example.com/share/my%20file.txt").reply(CONTENT),
    ]);
    let dav = client(transport);

    let got = dav
        .get("http://other.example.com/share/my%20file.txt")
        .await
        .unwrap();
    assert_eq!(&got.body[..], CONTENT.as_bytes());
}

#[tokio::test]
async fn relative_target_without_base_url() {
    let transport = MockTransport::new(vec![]);
    let dav = dav_client::WebDavClient::new(transport, Default::default());

    let err = dav.get("test.txt").await.unwrap_err();
    assert!(matches!(err, Error::Uri(_)));
}

#[tokio::test]
async fn locked_failure_keeps_the_precondition() {
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
<D:error xmlns:D="DAV:">
  <D:lock-token-submitted>
    <D:href>/dav/test.txt</D:href>
  </D:lock-token-submitted>
</D:error>"#;
    let transport = MockTransport::new(vec![
        Exchange::new(Method::DELETE, FILE).status(423).reply(body)
    ]);
    let dav = client(transport);

    let err = dav.delete("test.txt", None).await.unwrap_err();
    let failure = err.failure().unwrap();
    assert!(failure.is_locked());
    assert!(!failure.is_transport());
    assert_eq!(failure.status, Some(StatusCode::LOCKED));
    let violations = &failure.error.as_ref().unwrap().0;
    assert!(matches!(
        violations.as_slice(),
        [Violation::LockTokenSubmitted(hrefs)] if hrefs[0].0 == "/dav/test.txt"
    ));
}

#[tokio::test]
async fn failed_multistatus_body_is_kept() {
    let body = multistatus(
        r#"<D:response><D:href>/dav/folder/locked.txt</D:href><D:status>HTTP/1.1 423 Locked</D:status></D:response>"#,
    );
    let transport = MockTransport::new(vec![
        Exchange::new(Method::DELETE, "http://localhost:8080/dav/folder")
            .status(424)
            .reply(body),
    ]);
    let dav = client(transport);

    let err = dav.delete("folder", None).await.unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.status, Some(StatusCode::FAILED_DEPENDENCY));
    let ms = failure.multistatus.as_ref().unwrap();
    assert_eq!(ms.failures()[0].1 .0, StatusCode::LOCKED);
}

#[tokio::test]
async fn unreachable_server_is_a_normalized_failure_for_every_verb() {
    let transport = MockTransport::new(vec![]);
    let dav = client(transport.clone());
    let token = LockToken::new("opaquelocktoken:abc");
    let update = PropertyUpdate(vec![PropertyUpdateItem::Set(displayname("X"))]);
    let info = dav_client::dav::LockInfo {
        lockscope: dav_client::dav::LockScope::Exclusive,
        locktype: dav_client::dav::LockType::Write,
        owner: None,
    };
    let timeouts = dav_client::Timeouts::from(dav_client::dav::Timeout::Seconds(60));

    let results: Vec<Error> = vec![
        dav.propfind("a", Depth::Zero, &PropFind::AllProp).await.unwrap_err(),
        dav.propfind_raw("a", Depth::Zero, "<x/>").await.unwrap_err(),
        dav.proppatch("a", &update, None).await.unwrap_err(),
        dav.mkcol("a", None).await.unwrap_err(),
        dav.copy_to("a", "b", Depth::Infinity, None).await.unwrap_err(),
        dav.move_to("a", "b", None, None).await.unwrap_err(),
        dav.delete("a", None).await.unwrap_err(),
        dav.get("a").await.unwrap_err(),
        dav.get_stream("a").await.unwrap_err(),
        dav.head("a").await.unwrap_err(),
        dav.put("a", "x", None, None).await.unwrap_err(),
        dav.lock("a", &timeouts, Depth::Zero, &info).await.unwrap_err(),
        dav.refresh_lock("a", &timeouts, Some(&token)).await.unwrap_err(),
        dav.unlock("a", Some(&token)).await.unwrap_err(),
    ];

    for err in results {
        let failure = err.failure().expect("normalized failure");
        assert!(failure.is_transport());
        assert_eq!(failure.status, None);
    }

    let methods: Vec<_> = transport.seen().into_iter().map(|r| r.method).collect();
    assert!(methods.contains(&*LOCK));
    assert!(methods.contains(&*UNLOCK));
    assert_eq!(methods.len(), 14);
}
