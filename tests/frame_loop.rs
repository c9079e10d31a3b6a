use anyhow::Result;

use pothole_guard::config::{AnalysisSettings, SourceSettings};
use pothole_guard::detect::{ScriptEnd, ScriptedBackend, StubBackend};
use pothole_guard::ingest::FileSource;
use pothole_guard::{
    AnalysisError, AnalysisSession, DetectorStatus, DirectorySink, FrameAnalysis,
    FrameAnalysisLoop, FrameSource, LoopOutcome, PresentationSink, SeverityStatus, SourceKind,
    StopSignal,
};

#[derive(Default)]
struct RecordingSink {
    frames: Vec<(u64, u32, u32, SeverityStatus)>,
    incidents: Vec<u64>,
    statuses: Vec<DetectorStatus>,
    stop_after: Option<(u64, StopSignal)>,
}

impl PresentationSink for RecordingSink {
    fn present(&mut self, analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
        let index = analysis.annotated.index;
        self.frames.push((
            index,
            analysis.current_count,
            analysis.peak_count,
            analysis.status,
        ));
        if let Some(entry) = &analysis.new_entry {
            self.incidents.push(entry.frame_index);
        }
        if let Some((limit, stop)) = &self.stop_after {
            if self.frames.len() as u64 >= *limit {
                stop.stop();
            }
        }
        Ok(())
    }

    fn detector_status(&mut self, status: &DetectorStatus) {
        self.statuses.push(status.clone());
    }
}

struct ClosedDisplay;

impl PresentationSink for ClosedDisplay {
    fn present(&mut self, _analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
        Err(AnalysisError::SinkUnavailable("display closed".into()))
    }
}

fn png(shade: u8) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(48, 32, image::Rgb([shade, shade, shade]));
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

fn source_settings() -> SourceSettings {
    SourceSettings {
        target_fps: 0,
        width: 160,
        height: 96,
        synthetic_frames: 5,
        ..SourceSettings::default()
    }
}

fn live_settings() -> AnalysisSettings {
    AnalysisSettings {
        resize_dim: Some((64, 64)),
        ..AnalysisSettings::default()
    }
}

#[test]
fn still_image_with_three_defects() -> Result<()> {
    let mut session = AnalysisSession::init(
        StubBackend::new(),
        SourceKind::Image,
        AnalysisSettings::default(),
    )?;
    let mut source =
        FrameSource::open(SourceKind::Image, "stub://road?defects=3", &source_settings())?;
    let mut sink = RecordingSink::default();

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new()).run(&mut source, &mut sink);

    assert_eq!(report.outcome, LoopOutcome::Exhausted);
    assert_eq!(sink.frames, vec![(1, 3, 3, SeverityStatus::Routine)]);
    let summary = session.teardown();
    assert_eq!(summary.incidents.len(), 1);
    assert!(summary.incidents[0].to_string().ends_with("Image: 3 detected"));
    Ok(())
}

#[test]
fn video_accumulates_peak_and_history() -> Result<()> {
    let mut session = AnalysisSession::init(
        ScriptedBackend::new(vec![0, 2, 0, 5, 1]),
        SourceKind::Video,
        AnalysisSettings::default(),
    )?;
    let blobs = (0..5).map(|i| png(40 * i as u8)).collect();
    let mut source = FrameSource::Video(FileSource::from_encoded(blobs));
    let mut sink = RecordingSink::default();

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new()).run(&mut source, &mut sink);

    assert_eq!(report.outcome, LoopOutcome::Exhausted);
    assert_eq!(report.frames_delivered, 5);
    let peaks: Vec<u32> = sink.frames.iter().map(|f| f.2).collect();
    assert_eq!(peaks, vec![0, 2, 2, 5, 5]);
    let statuses: Vec<SeverityStatus> = sink.frames.iter().map(|f| f.3).collect();
    assert_eq!(
        statuses,
        vec![
            SeverityStatus::Optimal,
            SeverityStatus::Routine,
            SeverityStatus::Routine,
            SeverityStatus::Critical,
            SeverityStatus::Critical,
        ]
    );
    assert_eq!(sink.incidents, vec![2, 4, 5]);

    let summary = session.teardown();
    assert_eq!(summary.peak_count, 5);
    assert_eq!(summary.status, SeverityStatus::Critical);
    let history: Vec<u64> = summary.incidents.iter().map(|e| e.frame_index).collect();
    assert_eq!(history, vec![5, 4, 2]);
    Ok(())
}

#[test]
fn corrupted_frame_is_skipped_without_touching_stats() -> Result<()> {
    let mut session = AnalysisSession::init(
        ScriptedBackend::new(vec![2, 1]),
        SourceKind::Video,
        AnalysisSettings::default(),
    )?;
    let mut source = FrameSource::Video(FileSource::from_encoded(vec![
        png(10),
        b"truncated upload".to_vec(),
        png(200),
    ]));
    let mut sink = RecordingSink::default();

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new()).run(&mut source, &mut sink);

    assert_eq!(report.outcome, LoopOutcome::Exhausted);
    assert_eq!(report.frames_delivered, 3);
    assert_eq!(report.decode_failures, 1);
    assert_eq!(session.backend().calls(), 2);
    assert_eq!(session.stats().frames_processed, 2);
    assert_eq!(session.stats().frames_skipped, 1);
    assert_eq!(sink.incidents, vec![1, 3]);
    Ok(())
}

#[test]
fn live_feed_stops_when_detector_disappears() -> Result<()> {
    let backend = ScriptedBackend::new(vec![1, 0, 3]).with_end(ScriptEnd::Unavailable);
    let mut session = AnalysisSession::init(backend, SourceKind::Live, live_settings())?;
    let mut source = FrameSource::open(SourceKind::Live, "stub://dashcam", &source_settings())?;
    let mut sink = RecordingSink::default();

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new()).run(&mut source, &mut sink);

    assert!(matches!(report.outcome, LoopOutcome::DetectorLost(_)));
    assert_eq!(sink.frames.len(), 3);
    assert_eq!(sink.frames[2], (3, 3, 3, SeverityStatus::Routine));
    assert_eq!(sink.statuses.len(), 2);
    assert!(sink.statuses[0].is_active());
    assert!(!sink.statuses[1].is_active());
    assert!(!source.is_healthy(), "camera must be released");

    let summary = session.teardown();
    assert_eq!(summary.peak_count, 3);
    assert!(!summary.detector.is_active());
    Ok(())
}

#[test]
fn annotated_live_frames_keep_native_resolution() -> Result<()> {
    let mut session = AnalysisSession::init(StubBackend::new(), SourceKind::Live, live_settings())?;
    let mut source =
        FrameSource::open(SourceKind::Live, "stub://dashcam?frames=2", &source_settings())?;
    let dir = tempfile::tempdir()?;
    let mut sink = DirectorySink::create(dir.path())?;

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new()).run(&mut source, &mut sink);

    assert_eq!(report.outcome, LoopOutcome::Exhausted);
    assert_eq!(sink.frames_written(), 2);
    let saved = image::open(sink.frame_path(1))?;
    assert_eq!((saved.width(), saved.height()), (160, 96));
    Ok(())
}

#[test]
fn stop_signal_cancels_live_feed() -> Result<()> {
    let mut session = AnalysisSession::init(
        ScriptedBackend::new(vec![1]).with_end(ScriptEnd::Repeat),
        SourceKind::Live,
        live_settings(),
    )?;
    let mut source = FrameSource::open(SourceKind::Live, "stub://dashcam", &source_settings())?;
    let stop = StopSignal::new();
    let mut sink = RecordingSink {
        stop_after: Some((4, stop.clone())),
        ..RecordingSink::default()
    };

    let report = FrameAnalysisLoop::new(&mut session, stop).run(&mut source, &mut sink);

    assert_eq!(report.outcome, LoopOutcome::Cancelled);
    assert_eq!(report.frames_delivered, 4);
    assert_eq!(session.stats().incident_log().len(), 4);
    assert!(!source.is_healthy());
    Ok(())
}

#[test]
fn stop_before_start_processes_nothing() -> Result<()> {
    let mut session = AnalysisSession::init(
        StubBackend::new(),
        SourceKind::Live,
        live_settings(),
    )?;
    let mut source = FrameSource::open(SourceKind::Live, "stub://dashcam", &source_settings())?;
    let stop = StopSignal::new();
    stop.stop();

    let report =
        FrameAnalysisLoop::new(&mut session, stop).run(&mut source, &mut RecordingSink::default());

    assert_eq!(report.outcome, LoopOutcome::Cancelled);
    assert_eq!(report.frames_delivered, 0);
    assert_eq!(session.stats().frames_processed, 0);
    Ok(())
}

#[test]
fn display_failures_do_not_stop_the_loop() -> Result<()> {
    let mut session = AnalysisSession::init(
        ScriptedBackend::new(vec![1, 1, 1]),
        SourceKind::Video,
        AnalysisSettings::default(),
    )?;
    let mut source = FrameSource::open(SourceKind::Video, "stub://patrol?frames=3", &source_settings())?;

    let report =
        FrameAnalysisLoop::new(&mut session, StopSignal::new()).run(&mut source, &mut ClosedDisplay);

    assert_eq!(report.outcome, LoopOutcome::Exhausted);
    assert_eq!(report.sink_failures, 3);
    assert_eq!(session.stats().frames_processed, 3);
    assert_eq!(session.stats().peak_count, 1);
    Ok(())
}

#[test]
fn persistent_decode_failures_end_a_live_feed() -> Result<()> {
    let mut session = AnalysisSession::init(StubBackend::new(), SourceKind::Live, live_settings())?;
    let mut source = FrameSource::open(
        SourceKind::Live,
        "stub://dashcam?corrupt=100",
        &source_settings(),
    )?;

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new())
        .with_decode_failure_limit(3)
        .run(&mut source, &mut RecordingSink::default());

    assert!(matches!(report.outcome, LoopOutcome::SourceFailed(_)));
    assert_eq!(report.decode_failures, 3);
    assert_eq!(session.stats().frames_processed, 0);
    assert!(!source.is_healthy());
    Ok(())
}

#[test]
fn live_feed_recovers_after_a_burst_of_bad_frames() -> Result<()> {
    let mut session = AnalysisSession::init(
        ScriptedBackend::new(vec![1, 1]),
        SourceKind::Live,
        live_settings(),
    )?;
    let mut source = FrameSource::open(
        SourceKind::Live,
        "stub://dashcam?corrupt=2&frames=4",
        &source_settings(),
    )?;

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new())
        .with_decode_failure_limit(3)
        .run(&mut source, &mut RecordingSink::default());

    assert_eq!(report.outcome, LoopOutcome::Exhausted);
    assert_eq!(report.decode_failures, 2);
    assert_eq!(session.stats().frames_processed, 2);
    Ok(())
}

#[test]
fn bounded_video_skips_any_number_of_bad_frames() -> Result<()> {
    let mut session = AnalysisSession::init(
        ScriptedBackend::new(vec![2]),
        SourceKind::Video,
        AnalysisSettings::default(),
    )?;
    let mut blobs: Vec<Vec<u8>> = (0..31).map(|_| b"corrupt".to_vec()).collect();
    blobs.push(png(120));
    let mut source = FrameSource::Video(FileSource::from_encoded(blobs));
    let mut sink = RecordingSink::default();

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new()).run(&mut source, &mut sink);

    assert_eq!(report.outcome, LoopOutcome::Exhausted);
    assert_eq!(report.frames_delivered, 32);
    assert_eq!(report.decode_failures, 31);
    assert_eq!(sink.frames, vec![(32, 2, 2, SeverityStatus::Routine)]);
    let stats = session.stats();
    assert_eq!(stats.frames_processed, 1);
    assert_eq!(stats.frames_skipped, 31);
    assert_eq!(stats.peak_count, 2);
    Ok(())
}

#[test]
fn unreachable_source_fails_before_any_frame() -> Result<()> {
    let mut session = AnalysisSession::init(
        StubBackend::new(),
        SourceKind::Image,
        AnalysisSettings::default(),
    )?;
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("missing.jpg");
    let mut source = FrameSource::open(
        SourceKind::Image,
        &missing.display().to_string(),
        &source_settings(),
    )?;

    let report = FrameAnalysisLoop::new(&mut session, StopSignal::new())
        .run(&mut source, &mut RecordingSink::default());

    assert!(matches!(report.outcome, LoopOutcome::SourceFailed(_)));
    assert_eq!(session.stats().frames_processed, 0);
    Ok(())
}
