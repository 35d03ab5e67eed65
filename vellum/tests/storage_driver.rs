use vellum::{memory::MemoryDriver, prelude::*};

const WORKSPACE: &str = "+gardening.abcde";
const SUZY: &str = "@suzy.bolxx3bc6gmoa43rr5qfgv6r65zbqjwtzcnr7zyef2hvpftw45clq";
const TIMM: &str = "@timm.baaaaaaaaaaaaaaaaaaaaaaaaazbqjwtzcnr7zyef2hvpftw45clq";
const BOBO: &str = "@bobo.bxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxnr7zyef2hvpftw45clq";
const T: i64 = 1_619_627_796_035_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn base_doc() -> Document {
    Document {
        path: "/posts/post-0000.txt".to_string(),
        author: SUZY.to_string(),
        content: "Hello 0".to_string(),
        content_hash: "bnkc2f3fbdfpfeanwcgbid4t2lanmtq2obsvijhsagmn3x652h57a".to_string(),
        timestamp: T,
        delete_after: None,
        workspace: "+gardening.abc".to_string(),
        // the store never checks signatures
        signature: "whatever0".to_string(),
        local_index: None,
    }
}

fn variant(author: &str, n: i64, timestamp: i64) -> Document {
    Document {
        author: author.to_string(),
        content: format!("Hello {n}"),
        timestamp,
        signature: format!("whatever{n}"),
        ..base_doc()
    }
}

fn contents(docs: &[SharedDoc]) -> Vec<String> {
    docs.iter().map(|doc| doc.content.clone()).collect()
}

fn query(json: &str) -> Query {
    serde_json::from_str(json).unwrap()
}

#[tokio::test]
async fn empty_storage_then_close() {
    init_tracing();
    let driver = MemoryDriver::builder(WORKSPACE).build().await.unwrap();

    assert_eq!(driver.max_local_index().unwrap(), None);
    assert!(driver.query_docs(&Query::new()).await.unwrap().is_empty());

    driver.close(true).await.unwrap();
    assert!(driver.is_closed());
    assert_eq!(driver.lifecycle(), Lifecycle::Closed);

    assert_eq!(driver.max_local_index(), Err(DocumentStoreError::Closed));
    assert_eq!(
        driver.query_docs(&Query::new()).await.unwrap_err(),
        DocumentStoreError::Closed
    );
    assert_eq!(
        driver.upsert(base_doc()).await.unwrap_err(),
        DocumentStoreError::Closed
    );
}

#[tokio::test]
async fn upsert_and_query_one_path() {
    init_tracing();
    let driver = MemoryDriver::builder(WORKSPACE).build().await.unwrap();
    let latest = query(r#"{"historyMode":"latest"}"#);
    let all = query(r#"{"historyMode":"all"}"#);

    let doc0 = base_doc();
    let doc1 = variant(SUZY, 1, T + 1);
    let doc2 = variant(TIMM, 2, T + 2);
    let doc3 = variant(TIMM, 3, T - 3);
    let doc4 = variant(BOBO, 4, T - 4);

    let stored = driver.upsert(doc0).await.unwrap();
    assert_eq!(stored.local_index, Some(0));
    assert_eq!(driver.max_local_index().unwrap(), stored.local_index);
    let docs = driver.query_docs(&Query::new()).await.unwrap();
    assert_eq!(contents(&docs), ["Hello 0"]);
    assert_eq!(docs[0].local_index, Some(0));

    // same author, newer
    let stored = driver.upsert(doc1).await.unwrap();
    assert_eq!(stored.local_index, Some(1));
    assert_eq!(driver.max_local_index().unwrap(), Some(1));
    let docs = driver.query_docs(&Query::new()).await.unwrap();
    assert_eq!(contents(&docs), ["Hello 1"]);
    assert_eq!(docs[0].local_index, Some(1));

    // second author, newer still
    let stored = driver.upsert(doc2).await.unwrap();
    assert_eq!(stored.local_index, Some(2));
    let docs = driver.query_docs(&latest).await.unwrap();
    assert_eq!(contents(&docs), ["Hello 2"]);
    assert_eq!(docs[0].local_index, Some(2));
    assert_eq!(contents(&driver.query_docs(&all).await.unwrap()), ["Hello 2", "Hello 1"]);

    // second author again, but older; still stored
    let stored = driver.upsert(doc3).await.unwrap();
    assert_eq!(stored.local_index, Some(3));
    let docs = driver.query_docs(&latest).await.unwrap();
    assert_eq!(contents(&docs), ["Hello 1"]);
    assert_eq!(docs[0].local_index, Some(1));
    assert_eq!(contents(&driver.query_docs(&all).await.unwrap()), ["Hello 1", "Hello 3"]);

    // third author, oldest
    let stored = driver.upsert(doc4).await.unwrap();
    assert_eq!(stored.local_index, Some(4));
    assert_eq!(driver.max_local_index().unwrap(), Some(4));
    assert_eq!(contents(&driver.query_docs(&latest).await.unwrap()), ["Hello 1"]);
    assert_eq!(
        contents(&driver.query_docs(&all).await.unwrap()),
        ["Hello 1", "Hello 3", "Hello 4"]
    );

    let author_filter = format!(
        r#"{{"historyMode":"all","orderBy":"path ASC","filter":{{"author":"{SUZY}"}}}}"#
    );
    let vectors: Vec<(Query, Vec<&str>)> = vec![
        (
            query(r#"{"historyMode":"all","orderBy":"localIndex ASC"}"#),
            vec!["Hello 1", "Hello 3", "Hello 4"],
        ),
        (
            query(r#"{"historyMode":"all","orderBy":"localIndex ASC","limit":2}"#),
            vec!["Hello 1", "Hello 3"],
        ),
        (
            query(r#"{"historyMode":"all","orderBy":"localIndex ASC","startAfter":{"localIndex":2}}"#),
            vec!["Hello 3", "Hello 4"],
        ),
        (
            query(r#"{"historyMode":"all","orderBy":"localIndex ASC","startAfter":{"path":"a"}}"#),
            vec![],
        ),
        (
            query(r#"{"historyMode":"all","orderBy":"localIndex ASC","startAfter":{"localIndex":2},"limit":1}"#),
            vec!["Hello 3"],
        ),
        (
            query(r#"{"historyMode":"all","orderBy":"localIndex DESC"}"#),
            vec!["Hello 4", "Hello 3", "Hello 1"],
        ),
        (
            query(r#"{"historyMode":"all","orderBy":"path ASC"}"#),
            vec!["Hello 1", "Hello 3", "Hello 4"],
        ),
        (query(r#"{"historyMode":"latest"}"#), vec!["Hello 1"]),
        (query("{}"), vec!["Hello 1"]),
        (query(r#"{"limit":0}"#), vec![]),
        (query(&author_filter), vec!["Hello 1"]),
    ];

    for (query, expected) in vectors {
        let actual = contents(&driver.query_docs(&query).await.unwrap());
        assert_eq!(actual, expected, "query: {}", serde_json::to_string(&query).unwrap());
    }

    driver.close(true).await.unwrap();
}

#[tokio::test]
async fn latest_is_one_winner_per_path() {
    let driver = MemoryDriver::builder(WORKSPACE).build().await.unwrap();

    for (path, author, n, timestamp) in [
        ("/a", SUZY, 1, 10),
        ("/a", TIMM, 2, 20),
        ("/b", SUZY, 3, 30),
        ("/b", TIMM, 4, 30),
        ("/c", BOBO, 5, 5),
    ] {
        driver
            .upsert(Document {
                path: path.to_string(),
                ..variant(author, n, timestamp)
            })
            .await
            .unwrap();
    }

    let asc = driver.query_docs(&Query::new()).await.unwrap();
    // "/b" is a tie on timestamp; "whatever3" sorts before "whatever4"
    assert_eq!(contents(&asc), ["Hello 2", "Hello 3", "Hello 5"]);

    let desc = driver
        .query_docs(&Query::builder().order_by(OrderBy::PathDesc).build())
        .await
        .unwrap();
    assert_eq!(contents(&desc), ["Hello 5", "Hello 3", "Hello 2"]);

    let all = driver
        .query_docs(&Query::builder().history_mode(HistoryMode::All).build())
        .await
        .unwrap();
    assert_eq!(
        contents(&all),
        ["Hello 2", "Hello 1", "Hello 3", "Hello 4", "Hello 5"]
    );

    let page = driver
        .query_docs(
            &Query::builder()
                .history_mode(HistoryMode::All)
                .start_at(Cursor::path("/b"))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(contents(&page), ["Hello 3", "Hello 4", "Hello 5"]);
}

#[tokio::test]
async fn malformed_queries_are_rejected() {
    let driver = MemoryDriver::builder(WORKSPACE).build().await.unwrap();

    let both_cursors = Query::builder()
        .start_at(Cursor::path("/a"))
        .start_after(Cursor::path("/b"))
        .build();
    assert!(matches!(
        driver.query_docs(&both_cursors).await,
        Err(DocumentStoreError::Validation(_))
    ));

    assert!(serde_json::from_str::<Query>(r#"{"orderBy":"timestamp ASC"}"#).is_err());
    assert!(matches!(
        "timestamp ASC".parse::<OrderBy>(),
        Err(DocumentStoreError::Validation(_))
    ));
}

#[tokio::test]
async fn hatching_is_explicit_for_new_drivers() {
    let driver = MemoryDriver::new(WORKSPACE);
    assert_eq!(driver.lifecycle(), Lifecycle::New);
    assert_eq!(driver.max_local_index(), Err(DocumentStoreError::NotReady));

    driver.hatch().await.unwrap();
    assert!(driver.lifecycle().is_ready());
    assert!(driver.storage_id().await.unwrap().is_some());
}
