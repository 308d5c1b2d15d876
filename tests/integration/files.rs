use crate::*;

use ferry_core::frame::FramedConnection;
use ferry_core::message::{FileEntry, ListHeader, ERR, OK};
use ferry_services::TransferError;

/// Upload a multi-chunk file, download it back, and compare bytes.
#[tokio::test]
async fn test_upload_download_roundtrip() {
    let server = TestServer::start().await;
    let local = tempfile::tempdir().unwrap();
    let data = sample(3 * MIB + 1234, 7);
    let source = local_file(local.path(), "big.bin", &data);

    let mut client = server.client().await;
    let report = client.upload(&source, "big.bin").await.unwrap();
    assert_eq!(report.bytes, data.len() as u64);
    assert_eq!(report.chunks, 4);
    assert_eq!(server.stored("big.bin").unwrap(), data);

    let copy = local.path().join("copy.bin");
    let report = client.download("big.bin", &copy).await.unwrap();
    assert_eq!(report.chunks, 4);
    assert_eq!(std::fs::read(&copy).unwrap(), data);
}

/// A zero-byte file is just the terminal chunk.
#[tokio::test]
async fn test_empty_file() {
    let server = TestServer::start().await;
    let local = tempfile::tempdir().unwrap();
    let source = local_file(local.path(), "empty", b"");

    let mut client = server.client().await;
    let report = client.upload(&source, "empty").await.unwrap();
    assert_eq!(report.chunks, 0);
    assert_eq!(server.stored("empty").unwrap(), b"");

    let entries = client.list().await.unwrap();
    assert_eq!(entries, vec![FileEntry { name: "empty".into(), size: 0 }]);
}

/// Uploading an existing name replaces the stored file.
#[tokio::test]
async fn test_upload_overwrites() {
    let server = TestServer::start().await;
    let local = tempfile::tempdir().unwrap();

    let mut client = server.client().await;
    client
        .upload(&local_file(local.path(), "v1", b"first version"), "doc.txt")
        .await
        .unwrap();
    client
        .upload(&local_file(local.path(), "v2", b"second"), "doc.txt")
        .await
        .unwrap();

    assert_eq!(server.stored("doc.txt").unwrap(), b"second");
    assert_eq!(client.list().await.unwrap().len(), 1);
}

/// Names with spaces, colons and unicode survive the list encoding.
#[tokio::test]
async fn test_list_unusual_names() {
    let server = TestServer::start().await;
    let local = tempfile::tempdir().unwrap();
    let names = ["a b.txt", "x::y::z", "résumé.pdf"];

    let mut client = server.client().await;
    for (i, name) in names.iter().enumerate() {
        let src = local_file(local.path(), &format!("src{i}"), &sample(100 * (i + 1), i as u8));
        client.upload(&src, name).await.unwrap();
    }

    let entries = client.list().await.unwrap();
    let mut expected: Vec<FileEntry> = names
        .iter()
        .enumerate()
        .map(|(i, n)| FileEntry {
            name: n.to_string(),
            size: 100 * (i as u64 + 1),
        })
        .collect();
    expected.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(entries, expected);
}

/// List on an empty root: count 0, no entry frames.
#[tokio::test]
async fn test_list_empty_root() {
    let server = TestServer::start().await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let mut conn = FramedConnection::new(stream);

    conn.write_frame(b"r").await.unwrap();
    let header = conn.read_frame().await.unwrap().unwrap();
    assert_eq!(ListHeader::decode(&header).unwrap(), ListHeader::Count(0));

    // The next frame answers the next command, not a stray entry.
    conn.write_frame(b"x").await.unwrap();
    conn.write_frame(b"nothing").await.unwrap();
    assert_eq!(&conn.read_frame().await.unwrap().unwrap()[..], ERR);
}

/// Deleting a nonexistent file yields the explicit ERR token.
#[tokio::test]
async fn test_delete_nonexistent() {
    let server = TestServer::start().await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let mut conn = FramedConnection::new(stream);

    conn.write_frame(b"x").await.unwrap();
    conn.write_frame(b"ghost.txt").await.unwrap();
    assert_eq!(&conn.read_frame().await.unwrap().unwrap()[..], ERR);

    let mut client = server.client().await;
    let err = client.delete("ghost.txt").await.unwrap_err();
    assert!(matches!(err, TransferError::Refused(_)));
}

#[tokio::test]
async fn test_delete_existing() {
    let server = TestServer::start().await;
    std::fs::write(server.path("old.log"), b"stale").unwrap();

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let mut conn = FramedConnection::new(stream);
    conn.write_frame(b"x").await.unwrap();
    conn.write_frame(b"old.log").await.unwrap();
    assert_eq!(&conn.read_frame().await.unwrap().unwrap()[..], OK);
    assert!(server.stored("old.log").is_none());
}

/// Downloading a missing file is refused and the session carries on.
#[tokio::test]
async fn test_download_missing_is_refused() {
    let server = TestServer::start().await;
    let local = tempfile::tempdir().unwrap();

    let mut client = server.client().await;
    let err = client
        .download("absent.bin", &local.path().join("absent.bin"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Refused(_)));
    assert!(!local.path().join("absent.bin").exists());

    assert!(client.list().await.unwrap().is_empty());
}
