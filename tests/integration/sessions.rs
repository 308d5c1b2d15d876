use crate::*;

use ferry_core::message::FileEntry;

/// Two sessions upload different files at the same time; a later List on
/// either session sees both with the right sizes.
#[tokio::test]
async fn test_concurrent_sessions_upload() {
    let server = TestServer::start().await;
    let local = tempfile::tempdir().unwrap();

    let first = sample(2 * MIB + 17, 1);
    let second = sample(MIB / 2, 2);
    let first_path = local_file(local.path(), "first.bin", &first);
    let second_path = local_file(local.path(), "second.bin", &second);

    let mut a = server.client().await;
    let mut b = server.client().await;

    let (ra, rb) = tokio::join!(
        a.upload(&first_path, "first.bin"),
        b.upload(&second_path, "second.bin"),
    );
    ra.unwrap();
    rb.unwrap();

    let expected = vec![
        FileEntry { name: "first.bin".into(), size: first.len() as u64 },
        FileEntry { name: "second.bin".into(), size: second.len() as u64 },
    ];
    assert_eq!(a.list().await.unwrap(), expected);
    assert_eq!(b.list().await.unwrap(), expected);

    assert_eq!(server.stored("first.bin").unwrap(), first);
    assert_eq!(server.stored("second.bin").unwrap(), second);
}

/// Many sessions in parallel, each with several commands.
#[tokio::test]
async fn test_many_sessions_isolated() {
    let server = Arc::new(TestServer::start().await);
    let local = Arc::new(tempfile::tempdir().unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8u8 {
        let server = server.clone();
        let local = local.clone();
        tasks.spawn(async move {
            let data = sample(100_000 + i as usize * 1000, i);
            let name = format!("file-{i}.bin");
            let src = local_file(local.path(), &name, &data);

            let mut client = server.client().await;
            client.upload(&src, &name).await.unwrap();

            let back = local.path().join(format!("back-{i}.bin"));
            client.download(&name, &back).await.unwrap();
            assert_eq!(std::fs::read(&back).unwrap(), data);
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let mut client = server.client().await;
    assert_eq!(client.list().await.unwrap().len(), 8);
}

/// The active-connection count follows sessions opening and closing.
#[tokio::test]
async fn test_active_connection_count() {
    let server = TestServer::start().await;

    let mut a = server.client().await;
    let mut b = server.client().await;
    a.list().await.unwrap();
    b.list().await.unwrap();
    assert_eq!(server.active.get(), 2);

    drop(a);
    assert!(eventually(|| server.active.get() == 1).await);
    drop(b);
    assert!(eventually(|| server.active.get() == 0).await);
}
