//! The capture → decode → dedup → verify → log loop.
//!
//! Runs on the thread that owns the camera. One frame at a time, no
//! retries: a failed frame read ends the session with an error, an
//! unusable code region is skipped.

use rollcall_core::{
    extract_identity, CodeDecoder, CodeRegion, IdentityClaim, ScanEvent, ScanLogger,
    ScanStatus, SessionDeduplicator, Verifier,
};
use rollcall_hw::{CameraError, Frame, FrameSource};
use thiserror::Error;

use crate::overlay::{status_label, Annotation, Overlay};
use crate::stop::StopSignal;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("enrollment lookup failed: {0}")]
    Verify(#[source] BoxError),
    #[error("failed to log scan: {0}")]
    Log(#[source] BoxError),
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub dark_frames: u64,
    pub logged: usize,
    pub present: usize,
    pub invalid: usize,
}

/// A payload seen for the first time this session, after it was logged.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub region: CodeRegion,
    pub claim: IdentityClaim,
    pub event: ScanEvent,
}

/// State for one run of the scanner, from camera open to release.
pub struct Session<'a, D, B> {
    decoder: D,
    book: &'a B,
    overlay: Option<&'a Overlay>,
    dedup: SessionDeduplicator,
    summary: SessionSummary,
}

impl<'a, D, B> Session<'a, D, B>
where
    D: CodeDecoder,
    B: Verifier + ScanLogger,
{
    pub fn new(decoder: D, book: &'a B, overlay: Option<&'a Overlay>) -> Self {
        Self {
            decoder,
            book,
            overlay,
            dedup: SessionDeduplicator::new(),
            summary: SessionSummary::default(),
        }
    }

    /// Pull frames until the operator stops the loop or the source fails.
    pub fn run<S: FrameSource>(
        &mut self,
        source: &mut S,
        stop: &StopSignal,
    ) -> Result<SessionSummary, SessionError> {
        tracing::info!("scan session started");
        let result = self.pump(source, stop);
        tracing::info!(
            frames = self.summary.frames,
            dark_frames = self.summary.dark_frames,
            logged = self.summary.logged,
            present = self.summary.present,
            invalid = self.summary.invalid,
            ok = result.is_ok(),
            "scan session ended"
        );
        result.map(|()| self.summary.clone())
    }

    fn pump<S: FrameSource>(&mut self, source: &mut S, stop: &StopSignal) -> Result<(), SessionError> {
        while !stop.is_requested() {
            let frame = source.next_frame()?;
            self.summary.frames += 1;

            if frame.is_dark {
                self.summary.dark_frames += 1;
                tracing::trace!(seq = frame.sequence, "skipping dark frame");
                continue;
            }

            self.process_frame(&frame)?;
        }
        Ok(())
    }

    /// Decode one frame and classify and log every payload new to the session.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Vec<ScanOutcome>, SessionError> {
        let regions = self.decoder.decode(&frame.data, frame.width, frame.height);
        let mut outcomes = Vec::new();

        for region in regions {
            if !region.is_usable() {
                continue;
            }
            if self.dedup.has_seen(&region.payload) {
                continue;
            }

            let claim = extract_identity(&region.payload);
            let verified = self
                .book
                .verify(&claim)
                .map_err(|e| SessionError::Verify(Box::new(e)))?;
            let status = ScanStatus::from_verified(verified);

            let event = self
                .book
                .write(&region.payload, claim.roll_no.as_deref(), status)
                .map_err(|e| SessionError::Log(Box::new(e)))?;
            self.dedup.record(&region.payload);

            self.summary.logged += 1;
            match status {
                ScanStatus::Present => self.summary.present += 1,
                ScanStatus::Invalid => self.summary.invalid += 1,
            }

            tracing::info!(
                name = %claim.name,
                roll_no = claim.roll_no.as_deref().unwrap_or("-"),
                %status,
                id = event.id,
                latency_ms = frame.age().as_millis() as u64,
                "scanned"
            );
            println!("{}", status_label(&claim, status));

            outcomes.push(ScanOutcome {
                region,
                claim,
                event,
            });
        }

        if !outcomes.is_empty() {
            self.render(frame, &outcomes);
        }
        Ok(outcomes)
    }

    fn render(&self, frame: &Frame, outcomes: &[ScanOutcome]) {
        let Some(overlay) = self.overlay else {
            return;
        };
        let annotations: Vec<Annotation<'_>> = outcomes
            .iter()
            .map(|o| Annotation {
                region: &o.region,
                claim: &o.claim,
                status: o.event.status,
            })
            .collect();
        if let Err(e) = overlay.snapshot(frame, &annotations) {
            tracing::warn!(error = %e, "failed to write snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_store::Database;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Hands out canned frames, then fails like an unplugged camera.
    struct FakeCamera {
        frames: VecDeque<Frame>,
        released: Arc<AtomicBool>,
    }

    impl FakeCamera {
        fn new(frames: usize, dark: bool) -> Self {
            let pixel = if dark { 0u8 } else { 128u8 };
            Self {
                frames: (0..frames)
                    .map(|i| Frame::from_gray(vec![pixel; 64 * 64], 64, 64, i as u32))
                    .collect(),
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl FrameSource for FakeCamera {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            self.frames
                .pop_front()
                .ok_or_else(|| CameraError::CaptureFailed("device disconnected".into()))
        }
    }

    impl Drop for FakeCamera {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Returns one scripted batch of regions per frame. Requests a stop
    /// once the script runs out when `stop` is set.
    struct ScriptedDecoder {
        script: VecDeque<Vec<CodeRegion>>,
        stop: Option<StopSignal>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedDecoder {
        fn new(script: Vec<Vec<CodeRegion>>, stop: Option<StopSignal>) -> Self {
            Self {
                script: script.into(),
                stop,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CodeDecoder for ScriptedDecoder {
        fn decode(&mut self, _gray: &[u8], _width: u32, _height: u32) -> Vec<CodeRegion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let batch = self.script.pop_front().unwrap_or_default();
            if self.script.is_empty() {
                if let Some(stop) = &self.stop {
                    stop.request();
                }
            }
            batch
        }
    }

    fn code(payload: &str) -> CodeRegion {
        CodeRegion {
            payload: payload.into(),
            corners: [(8, 8), (40, 8), (40, 40), (8, 40)],
        }
    }

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("attendance.db")).unwrap();
        db.enroll("Alice", "101").unwrap();
        (dir, db)
    }

    #[test]
    fn test_end_to_end_scenario() {
        let (_dir, db) = temp_db();
        let stop = StopSignal::new();
        let decoder = ScriptedDecoder::new(
            vec![
                vec![code("Alice - 101")],
                vec![code("Alice - 101"), code("Bob - 999")],
                vec![code("garbage-text")],
            ],
            Some(stop.clone()),
        );
        let mut camera = FakeCamera::new(10, false);

        let mut session = Session::new(decoder, &db, None);
        let summary = session.run(&mut camera, &stop).unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.logged, 3);
        assert_eq!(summary.present, 1);
        assert_eq!(summary.invalid, 2);

        let mut scans = db.list_scans().unwrap();
        scans.reverse();
        let logged: Vec<_> = scans
            .iter()
            .map(|e| (e.payload.as_str(), e.roll_no.as_deref(), e.status))
            .collect();
        assert_eq!(
            logged,
            vec![
                ("Alice - 101", Some("101"), ScanStatus::Present),
                ("Bob - 999", Some("999"), ScanStatus::Invalid),
                ("garbage-text", None, ScanStatus::Invalid),
            ]
        );
    }

    #[test]
    fn test_payload_repeated_across_many_frames_logged_once() {
        let (_dir, db) = temp_db();
        let stop = StopSignal::new();
        let script = (0..25).map(|_| vec![code("Alice - 101")]).collect();
        let decoder = ScriptedDecoder::new(script, Some(stop.clone()));
        let mut camera = FakeCamera::new(30, false);

        let summary = Session::new(decoder, &db, None)
            .run(&mut camera, &stop)
            .unwrap();
        assert_eq!(summary.frames, 25);
        assert_eq!(db.list_scans().unwrap().len(), 1);
    }

    #[test]
    fn test_same_payload_twice_in_one_frame() {
        let (_dir, db) = temp_db();
        let decoder = ScriptedDecoder::new(vec![vec![code("Bob - 999"), code("Bob - 999")]], None);
        let mut session = Session::new(decoder, &db, None);
        let frame = Frame::from_gray(vec![128u8; 64 * 64], 64, 64, 0);

        let outcomes = session.process_frame(&frame).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(db.list_scans().unwrap().len(), 1);
    }

    #[test]
    fn test_unusable_regions_skipped() {
        let (_dir, db) = temp_db();
        let degenerate = CodeRegion {
            payload: "Alice - 101".into(),
            corners: [(5, 5), (5, 5), (5, 5), (5, 5)],
        };
        let decoder = ScriptedDecoder::new(vec![vec![degenerate, code("")]], None);
        let mut session = Session::new(decoder, &db, None);
        let frame = Frame::from_gray(vec![128u8; 64 * 64], 64, 64, 0);

        assert!(session.process_frame(&frame).unwrap().is_empty());
        assert!(db.list_scans().unwrap().is_empty());
        // A degenerate sighting does not count as seen
        assert_eq!(session.dedup.len(), 0);
    }

    #[test]
    fn test_read_failure_is_fatal_and_keeps_earlier_scans() {
        let (_dir, db) = temp_db();
        let decoder = ScriptedDecoder::new(vec![vec![code("Alice - 101")]], None);
        let mut camera = FakeCamera::new(2, false);
        let released = camera.released.clone();

        {
            let stop = StopSignal::new();
            let mut session = Session::new(decoder, &db, None);
            let err = session.run(&mut camera, &stop).unwrap_err();
            assert!(matches!(err, SessionError::Camera(CameraError::CaptureFailed(_))));
            assert_eq!(session.summary.frames, 2);
        }
        drop(camera);

        assert!(released.load(Ordering::SeqCst));
        assert_eq!(db.list_scans().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_before_first_frame() {
        let (_dir, db) = temp_db();
        let stop = StopSignal::new();
        stop.request();
        let decoder = ScriptedDecoder::new(vec![], None);
        let calls = decoder.calls.clone();
        let mut camera = FakeCamera::new(3, false);

        let summary = Session::new(decoder, &db, None)
            .run(&mut camera, &stop)
            .unwrap();
        assert_eq!(summary, SessionSummary::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(camera.frames.len(), 3);
    }

    #[test]
    fn test_dark_frames_not_decoded() {
        let (_dir, db) = temp_db();
        let decoder = ScriptedDecoder::new(vec![vec![code("Alice - 101")]], None);
        let calls = decoder.calls.clone();
        let mut camera = FakeCamera::new(4, true);
        let stop = StopSignal::new();

        let mut session = Session::new(decoder, &db, None);
        assert!(session.run(&mut camera, &stop).is_err());
        assert_eq!(session.summary.dark_frames, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(db.list_scans().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_only_for_new_scans() {
        let (dir, db) = temp_db();
        let snaps = dir.path().join("snaps");
        let overlay = Overlay::new(&snaps, None).unwrap();
        let decoder = ScriptedDecoder::new(
            vec![vec![code("Alice - 101")], vec![code("Alice - 101")], vec![]],
            None,
        );
        let mut session = Session::new(decoder, &db, Some(&overlay));

        for seq in 0..3 {
            let frame = Frame::from_gray(vec![128u8; 64 * 64], 64, 64, seq);
            session.process_frame(&frame).unwrap();
        }
        assert_eq!(std::fs::read_dir(&snaps).unwrap().count(), 1);
    }
}
