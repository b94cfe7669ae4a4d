// Drive transport against a mock object store: chunked resumable uploads,
// resume-after-failure, streaming downloads, listing.

use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mineworker::transfer::{DriveTransport, RemoteArchive, ResumeState, resume_path};

const MIB: u64 = 1024 * 1024;
const TOTAL: u64 = 12 * MIB; // 12582912

fn write_archive(dir: &std::path::Path, len: u64) -> std::path::PathBuf {
    let archive = dir.join("world.zip");
    std::fs::write(&archive, vec![42u8; len as usize]).unwrap();
    archive
}

async fn mount_initiation(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .and(header("X-Upload-Content-Type", "application/zip"))
        .and(header("X-Upload-Content-Length", TOTAL.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}/upload/session/1", server.uri())),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn twelve_mib_upload_issues_three_exact_chunks() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), TOTAL);

    mount_initiation(&server).await;

    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .and(header("Content-Range", "bytes 0-5242879/12582912"))
        .respond_with(ResponseTemplate::new(308))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .and(header("Content-Range", "bytes 5242880-10485759/12582912"))
        .respond_with(ResponseTemplate::new(308))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .and(header("Content-Range", "bytes 10485760-12582911/12582912"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "remote123" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = DriveTransport::with_base_url("test-token", server.uri()).unwrap();
    let mut progress = Vec::new();
    let file_id = transport
        .upload(&archive, "folder1", "world.zip", |done, total| {
            progress.push((done, total));
        })
        .await
        .unwrap();

    assert_eq!(file_id, "remote123");
    assert_eq!(
        progress,
        vec![
            (5 * MIB, TOTAL),
            (10 * MIB, TOTAL),
            (TOTAL, TOTAL),
        ]
    );
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert!(!resume_path(&archive).exists());
}

#[tokio::test]
async fn failed_chunk_checkpoints_and_a_rerun_resumes_from_the_acked_byte() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), TOTAL);

    mount_initiation(&server).await;

    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .and(header("Content-Range", "bytes 0-5242879/12582912"))
        .respond_with(ResponseTemplate::new(308))
        .expect(1)
        .mount(&server)
        .await;
    // The second chunk dies exactly once; the rerun gets a fresh acceptance.
    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .and(header("Content-Range", "bytes 5242880-10485759/12582912"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let transport = DriveTransport::with_base_url("test-token", server.uri()).unwrap();
    let mut progress = Vec::new();
    let failed = transport
        .upload(&archive, "folder1", "world.zip", |done, total| {
            progress.push((done, total));
        })
        .await;

    assert!(failed.is_err());
    assert_eq!(progress, vec![(5 * MIB, TOTAL)]);

    let sidecar = resume_path(&archive);
    let state: ResumeState =
        serde_json::from_slice(&std::fs::read(&sidecar).unwrap()).unwrap();
    assert_eq!(state.acked_bytes, 5 * MIB);
    assert_eq!(state.session_url, format!("{}/upload/session/1", server.uri()));

    // Rerun: the transport probes the session, learns the first 5 MiB are
    // acknowledged, and sends only the remaining two chunks.
    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .and(header("Content-Range", "bytes */12582912"))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-5242879"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .and(header("Content-Range", "bytes 5242880-10485759/12582912"))
        .respond_with(ResponseTemplate::new(308))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .and(header("Content-Range", "bytes 10485760-12582911/12582912"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "remote123" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut resumed_progress = Vec::new();
    let file_id = transport
        .upload(&archive, "folder1", "world.zip", |done, total| {
            resumed_progress.push((done, total));
        })
        .await
        .unwrap();

    assert_eq!(file_id, "remote123");
    assert_eq!(resumed_progress, vec![(10 * MIB, TOTAL), (TOTAL, TOTAL)]);
    assert!(!sidecar.exists());
}

fn remote(id: &str, name: &str, size: u64) -> RemoteArchive {
    RemoteArchive {
        id: id.to_string(),
        name: name.to_string(),
        size_bytes: size,
        modified_at: "2026-06-01T00:00:00Z".parse().unwrap(),
    }
}

#[tokio::test]
async fn download_streams_the_whole_file_to_disk() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let body: Vec<u8> = (0..MIB).map(|i| (i % 251) as u8).collect();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/abc123"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let transport = DriveTransport::with_base_url("test-token", server.uri()).unwrap();
    let dest = dir.path().join("world.zip");
    let mut last = (0, 0);
    transport
        .download(&remote("abc123", "world.zip", MIB), &dest, |done, total| {
            assert!(done >= last.0);
            last = (done, total);
        })
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(last, (MIB, MIB));
}

#[tokio::test]
async fn midstream_download_failure_deletes_the_partial_file() {
    use std::io::{Read, Write};

    // wiremock cannot cut a response short, so play the store with a raw
    // socket: declare a 1 MiB body, send 64 KiB, then close the connection.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let dir = tempfile::tempdir().unwrap();

    let store = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0u8; 4096];
        let _ = stream.read(&mut request);
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1048576\r\n\r\n")
            .unwrap();
        stream.write_all(&vec![7u8; 64 * 1024]).unwrap();
    });

    let transport = DriveTransport::with_base_url("test-token", base).unwrap();
    let dest = dir.path().join("world.zip");
    let mut saw_progress = false;
    let result = transport
        .download(&remote("abc123", "world.zip", MIB), &dest, |_, _| {
            saw_progress = true;
        })
        .await;
    store.join().unwrap();

    // The sink was open and had received bytes; the failure must remove it.
    assert!(result.is_err());
    assert!(saw_progress);
    assert!(!dest.exists());
}

#[tokio::test]
async fn rejected_download_leaves_no_file_behind() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let transport = DriveTransport::with_base_url("test-token", server.uri()).unwrap();
    let dest = dir.path().join("world.zip");
    let result = transport
        .download(&remote("gone", "world.zip", MIB), &dest, |_, _| {})
        .await;

    assert!(result.is_err());
    assert!(!dest.exists());
}

#[tokio::test]
async fn listing_preserves_remote_order_and_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("orderBy", "modifiedTime desc"))
        .and(query_param(
            "q",
            "'folder1' in parents and trashed = false and mimeType = 'application/zip'",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                {
                    "id": "newer",
                    "name": "06-02-2026-10-00-00-AM.zip",
                    "mimeType": "application/zip",
                    "size": "2097152",
                    "modifiedTime": "2026-06-02T10:00:00.000Z"
                },
                {
                    "id": "older",
                    "name": "06-01-2026-10-00-00-AM.zip",
                    "mimeType": "application/zip",
                    "size": "1048576",
                    "modifiedTime": "2026-06-01T10:00:00.000Z"
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = DriveTransport::with_base_url("test-token", server.uri()).unwrap();
    let archives = transport.list_archives("folder1").await.unwrap();

    assert_eq!(archives.len(), 2);
    assert_eq!(archives[0].id, "newer");
    assert_eq!(archives[0].size_bytes, 2 * MIB);
    assert_eq!(archives[1].id, "older");
    assert!(archives[0].modified_at > archives[1].modified_at);
}

#[tokio::test]
async fn rejected_listing_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let transport = DriveTransport::with_base_url("test-token", server.uri()).unwrap();
    assert!(transport.list_archives("folder1").await.is_err());
}
