use std::sync::{Arc, Mutex};
use std::time::Duration;

use upload_client::{CandidateFile, ProgressReporter, UploadOutcome, UploadSession};

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn png(size_bytes: usize) -> CandidateFile {
    CandidateFile::from_bytes("photo.png", "image/png", vec![0x89u8; size_bytes])
}

/// Reporter that records every percentage it forwards
pub fn recording_reporter() -> (ProgressReporter, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let reporter = ProgressReporter::new(move |percent| sink.lock().unwrap().push(percent));
    (reporter, seen)
}

pub async fn wait_for_outcome(session: &mut UploadSession) -> UploadOutcome {
    tokio::time::timeout(TEST_TIMEOUT, session.wait_for_outcome())
        .await
        .expect("upload did not finish in time")
}

pub fn assert_non_decreasing(percents: &[u8]) {
    assert!(
        percents.windows(2).all(|pair| pair[0] <= pair[1]),
        "progress went backwards: {percents:?}"
    );
    assert!(percents.iter().all(|percent| *percent <= 100));
}
