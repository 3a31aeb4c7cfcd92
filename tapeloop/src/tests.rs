#[cfg(test)]
mod tests {
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    use crate::buffers::LoopBuffer;
    use crate::devices::{AudioInput, AudioOutput, InputStream, OutputHandle, SilentInput};
    use crate::error::{Error, Result};
    use crate::history::UndoHistory;
    use crate::speed::SpeedRatio;
    use crate::state::{PlaybackState, SharedState};
    use crate::stretch::{stretch, stretch_interruptible};
    use crate::tempo::{compute_loop_length, parse_configuration, TempoGrid, MAX_BPM};
    use crate::units::{ms_to_samples, Sample, SamplePosition, SAMPLE_RATE};
    use crate::wav;
    use crate::{Config, RecordToggle, Session};

    const TEST_CONFIG: Config = Config {
        sample_rate: SAMPLE_RATE,
        frame_size: 1024,
        poll_interval: Duration::from_millis(2),
    };

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            if Instant::now() > deadline {
                panic!("timed out waiting for {}", what);
            }
            sleep(Duration::from_millis(1));
        }
    }

    fn ramp(length: usize) -> Vec<Sample> {
        (0..length).map(|i| ((i % 2000) as Sample) - 1000).collect()
    }

    fn sine(frequency: f32, length: usize) -> Vec<Sample> {
        (0..length)
            .map(|i| (0.5 * (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin() * 32767.0) as Sample)
            .collect()
    }

    fn zero_crossings(samples: &[Sample]) -> usize {
        samples.windows(2).filter(|w| (w[0] < 0) != (w[1] < 0)).count()
    }

    // Output that never finishes and stays at the start of the loop.
    struct ManualOutput {
        started: Arc<AtomicUsize>,
    }

    struct ManualHandle;

    impl OutputHandle for ManualHandle {
        fn position(&self) -> SamplePosition { 0 }
        fn is_finished(&self) -> bool { false }
        fn cancel(&mut self) {}
    }

    impl AudioOutput for ManualOutput {
        fn start(&self, _samples: Vec<Sample>) -> Result<Box<dyn OutputHandle>> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ManualHandle))
        }
    }

    fn manual_output() -> (Arc<dyn AudioOutput>, Arc<AtomicUsize>) {
        let started = Arc::new(AtomicUsize::new(0));
        (Arc::new(ManualOutput { started: started.clone() }), started)
    }

    // Output whose play position is set by the test.
    struct PositionedOutput {
        cursor: Arc<AtomicUsize>,
    }

    struct PositionedHandle {
        cursor: Arc<AtomicUsize>,
    }

    impl OutputHandle for PositionedHandle {
        fn position(&self) -> SamplePosition { self.cursor.load(Ordering::SeqCst) }
        fn is_finished(&self) -> bool { false }
        fn cancel(&mut self) {}
    }

    impl AudioOutput for PositionedOutput {
        fn start(&self, _samples: Vec<Sample>) -> Result<Box<dyn OutputHandle>> {
            Ok(Box::new(PositionedHandle { cursor: self.cursor.clone() }))
        }
    }

    // Output that finishes each buffer almost at once and records its length.
    struct InstantOutput {
        played: Arc<Mutex<Vec<usize>>>,
    }

    struct InstantHandle {
        length: SamplePosition,
    }

    impl OutputHandle for InstantHandle {
        fn position(&self) -> SamplePosition { self.length }
        fn is_finished(&self) -> bool { true }
        fn cancel(&mut self) {}
    }

    impl AudioOutput for InstantOutput {
        fn start(&self, samples: Vec<Sample>) -> Result<Box<dyn OutputHandle>> {
            sleep(Duration::from_millis(1));
            self.played.lock().unwrap().push(samples.len());
            Ok(Box::new(InstantHandle { length: samples.len() }))
        }
    }

    // Input that delivers a fixed script of samples as fast as it is read.
    struct ScriptedInput {
        script: Vec<Sample>,
        frames_read: Arc<AtomicUsize>,
    }

    struct ScriptedStream {
        remaining: Vec<Sample>,
        frames_read: Arc<AtomicUsize>,
    }

    impl AudioInput for ScriptedInput {
        fn open(&self) -> Result<Box<dyn InputStream>> {
            Ok(Box::new(ScriptedStream {
                remaining: self.script.clone(),
                frames_read: self.frames_read.clone(),
            }))
        }
    }

    impl InputStream for ScriptedStream {
        fn read(&mut self, frame_size: usize, timeout: Duration) -> Result<Option<Vec<Sample>>> {
            if self.remaining.len() < frame_size {
                sleep(timeout);
                return Ok(None);
            }
            let frame: Vec<Sample> = self.remaining.drain(..frame_size).collect();
            self.frames_read.fetch_add(1, Ordering::SeqCst);
            Ok(Some(frame))
        }

        fn finish(&mut self) -> Vec<Sample> {
            self.remaining.drain(..).collect()
        }
    }

    fn scripted_input(script: Vec<Sample>) -> (Arc<dyn AudioInput>, Arc<AtomicUsize>) {
        let frames_read = Arc::new(AtomicUsize::new(0));
        (Arc::new(ScriptedInput { script, frames_read: frames_read.clone() }), frames_read)
    }

    struct BrokenInput;

    impl AudioInput for BrokenInput {
        fn open(&self) -> Result<Box<dyn InputStream>> {
            Err(Error::Device("unplugged".to_string()))
        }
    }

    fn silent_input() -> Arc<dyn AudioInput> {
        Arc::new(SilentInput::new(SAMPLE_RATE))
    }

    #[test]
    fn loop_length_rounds_up_to_whole_bars() {
        // 80 bpm is 3 s per bar; 10 s needs four bars.
        assert_eq!(compute_loop_length(80, 0, 10).unwrap(), 12000);
        assert_eq!(compute_loop_length(120, 0, 4).unwrap(), 4000);
        assert_eq!(compute_loop_length(120, 0, 5).unwrap(), 6000);
        assert_eq!(compute_loop_length(60, 1, 0).unwrap(), 60000);
        // 7 bpm: one bar is 34285.71 ms, truncated.
        assert_eq!(compute_loop_length(7, 0, 1).unwrap(), 34285);
    }

    #[test]
    fn loop_length_is_idempotent() {
        for &bpm in &[7, 80, 97, 133, 240, 999, 1000] {
            let grid = TempoGrid::new(bpm).unwrap();
            for &requested in &[1, 999, 10_000, 61_000, 185_000] {
                let length = grid.loop_length_ms(requested);
                assert!(length + 1 >= requested, "{} bpm: {} < {}", bpm, length, requested);
                assert_eq!(grid.loop_length_ms(length), length, "{} bpm, {} ms", bpm, requested);
            }
        }
    }

    #[test]
    fn zero_duration_gives_zero_length_loop() {
        assert_eq!(compute_loop_length(80, 0, 0).unwrap(), 0);
        assert!(LoopBuffer::silent(0).is_empty());
    }

    #[test]
    fn zero_bpm_is_rejected() {
        assert!(matches!(compute_loop_length(0, 0, 10), Err(Error::InvalidConfiguration(_))));
        assert!(TempoGrid::new(0).is_err());
    }

    #[test]
    fn tempo_has_an_upper_bound() {
        assert!(TempoGrid::new(MAX_BPM).is_ok());
        assert!(matches!(TempoGrid::new(MAX_BPM + 1), Err(Error::InvalidConfiguration(_))));
        assert!(matches!(compute_loop_length(240_000, 0, 10), Err(Error::InvalidConfiguration(_))));
        assert!(parse_configuration("1001", "0", "10").is_err());
    }

    #[test]
    fn configuration_fields_are_validated() {
        assert_eq!(parse_configuration("80", "0", "10").unwrap(), (80, 0, 10));
        assert_eq!(parse_configuration(" 120 ", "1", " 30").unwrap(), (120, 1, 30));

        for (bpm, minutes, seconds) in &[("abc", "0", "10"), ("80", "-1", "10"), ("80", "0", "1.5"),
                                         ("0", "0", "10"), ("80", "0", ""), ("80", "99999999999", "0")] {
            let result = parse_configuration(bpm, minutes, seconds);
            assert!(matches!(result, Err(Error::InvalidConfiguration(_))),
                    "{:?} accepted for {} {} {}", result, bpm, minutes, seconds);
        }
    }

    #[test]
    fn speed_control_mapping() {
        let ratio = |v: f64| SpeedRatio::from_control(v).unwrap().ratio();
        assert_eq!(ratio(0.0), 1.0);
        assert_eq!(ratio(1.0), 2.0);
        assert_eq!(ratio(5.0), 6.0);
        assert_eq!(ratio(-1.0), 0.5);
        assert!((ratio(-5.0) - 1.0 / 6.0).abs() < 1e-12);
        assert!((ratio(0.5) - 1.5).abs() < 1e-12);

        assert!(SpeedRatio::from_control(5.5).is_err());
        assert!(SpeedRatio::from_control(-6.0).is_err());
        assert!(SpeedRatio::from_control(f64::NAN).is_err());
    }

    #[test]
    fn speed_display() {
        assert_eq!(SpeedRatio::normal().to_string(), "Speed: 1.00x");
        assert_eq!(SpeedRatio::from_control(-2.0).unwrap().to_string(), "Speed: 0.33x");
    }

    #[test]
    fn overlay_mixes_in_place() {
        let buffer = LoopBuffer::from_samples(vec![1, 2, 3, 4, 5, 6]);
        let mixed = buffer.overlay(&[10, 10], 2);
        assert_eq!(mixed.samples(), &[1, 2, 13, 14, 5, 6]);
        // The original is untouched.
        assert_eq!(buffer.samples(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn overlay_extends_past_the_end() {
        let buffer = LoopBuffer::from_samples(vec![1, 1, 1]);
        assert_eq!(buffer.overlay(&[5, 5, 5], 2).samples(), &[1, 1, 6, 5, 5]);
        assert_eq!(buffer.overlay(&[7], 5).samples(), &[1, 1, 1, 0, 0, 7]);
        assert_eq!(buffer.overlay(&[], 10).len(), 10);
    }

    #[test]
    fn overlay_never_shrinks() {
        let buffer = LoopBuffer::silent(1000);
        assert_eq!(buffer.len(), 44100);
        assert_eq!(buffer.overlay(&[1; 10], 0).len(), 44100);
        assert_eq!(buffer.overlay(&[], 0).len(), 44100);
    }

    #[test]
    fn overlay_saturates() {
        let buffer = LoopBuffer::from_samples(vec![30000, -30000]);
        assert_eq!(buffer.overlay(&[10000, -10000], 0).samples(), &[Sample::MAX, Sample::MIN]);
    }

    #[test]
    fn overlay_over_silence_is_exact() {
        let segment = ramp(5000);
        let buffer = LoopBuffer::silent(1000).overlay_at_ms(&segment, 500);
        let start = ms_to_samples(500, SAMPLE_RATE);
        assert_eq!(&buffer.samples()[start..start + 5000], &segment[..]);
        assert!(buffer.samples()[..start].iter().all(|&s| s == 0));
    }

    #[test]
    fn undo_history_is_lifo() {
        let mut history = UndoHistory::new();
        assert!(matches!(history.pop(), Err(Error::NothingToUndo)));

        history.push(Arc::new(LoopBuffer::from_samples(vec![1])));
        history.push(Arc::new(LoopBuffer::from_samples(vec![2])));
        assert_eq!(history.len(), 2);
        assert_eq!(history.pop().unwrap().samples(), &[2]);
        assert_eq!(history.pop().unwrap().samples(), &[1]);
        assert!(history.is_empty());
    }

    #[test]
    fn shared_state_position_stays_in_range() {
        let shared = SharedState::new();
        shared.set_position(0.25);
        assert_eq!(shared.position(), 0.25);
        shared.set_position(1.0);
        assert_eq!(shared.position(), 0.0);
        shared.set_position(-3.0);
        assert_eq!(shared.position(), 0.0);
        shared.set_position(f64::NAN);
        assert_eq!(shared.position(), 0.0);
    }

    #[test]
    fn progress_percent() {
        let state = PlaybackState {
            position: 0.426,
            speed: SpeedRatio::normal(),
            is_playing: true,
            is_recording: false,
        };
        assert_eq!(state.progress_percent(), 42);
    }

    #[test]
    fn update_buffer_without_buffer_is_a_no_op() {
        let shared = SharedState::new();
        shared.update_buffer(|b| b.overlay(&[1], 0));
        assert!(shared.buffer().is_none());

        shared.replace_buffer(Some(Arc::new(LoopBuffer::from_samples(vec![0, 0]))));
        shared.update_buffer(|b| b.overlay(&[1], 1));
        assert_eq!(shared.buffer().unwrap().samples(), &[0, 1]);
    }

    #[test]
    fn stretch_at_normal_speed_is_identity() {
        let input = ramp(10_000);
        assert_eq!(stretch(&input, SAMPLE_RATE, 1.0).unwrap(), input);
    }

    #[test]
    fn stretch_output_length() {
        let input = sine(440.0, 44100);
        assert_eq!(stretch(&input, SAMPLE_RATE, 2.0).unwrap().len(), 22050);
        assert_eq!(stretch(&input, SAMPLE_RATE, 0.5).unwrap().len(), 88200);
        assert_eq!(stretch(&input, SAMPLE_RATE, 6.0).unwrap().len(), 7350);
        assert_eq!(stretch(&input, SAMPLE_RATE, 1.0 / 6.0).unwrap().len(), 264600);
        assert_eq!(stretch(&input[..100], SAMPLE_RATE, 3.0).unwrap().len(), 33);
    }

    #[test]
    fn stretch_preserves_pitch() {
        let input = sine(440.0, 44100);
        for &ratio in &[2.0, 0.5] {
            let output = stretch(&input, SAMPLE_RATE, ratio).unwrap();
            // Skip the edges, where the frames are only partly filled.
            let middle = &output[output.len() / 4..output.len() * 3 / 4];
            let seconds = middle.len() as f64 / SAMPLE_RATE as f64;
            let frequency = zero_crossings(middle) as f64 / 2.0 / seconds;
            assert!((frequency - 440.0).abs() < 20.0, "ratio {}: {} Hz", ratio, frequency);
        }
    }

    #[test]
    fn stretch_rejects_bad_input() {
        let input = ramp(1000);
        assert!(matches!(stretch(&input, SAMPLE_RATE, 0.0), Err(Error::StretchError(_))));
        assert!(matches!(stretch(&input, SAMPLE_RATE, -1.0), Err(Error::StretchError(_))));
        assert!(matches!(stretch(&input, SAMPLE_RATE, f64::INFINITY), Err(Error::StretchError(_))));
        assert!(matches!(stretch(&input, SAMPLE_RATE, 1000.0), Err(Error::StretchError(_))));
        assert!(matches!(stretch(&[], SAMPLE_RATE, 2.0), Err(Error::StretchError(_))));
        assert!(matches!(stretch(&input, 0, 2.0), Err(Error::StretchError(_))));
    }

    #[test]
    fn wav_keeps_samples_exactly() {
        let buffer = LoopBuffer::from_samples(vec![0, 1, -1, Sample::MAX, Sample::MIN, 1234]);
        let bytes = wav::encode_wav(&buffer).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(wav::decode_wav(&bytes).unwrap(), buffer);
    }

    #[test]
    fn wav_reads_float_and_rejects_stereo() {
        let float_spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut bytes = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut bytes, float_spec).unwrap();
            for &s in &[0.0f32, 0.5, -1.0, 2.0] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let buffer = wav::decode_wav(bytes.get_ref()).unwrap();
        assert_eq!(buffer.samples()[0], 0);
        assert_eq!(buffer.samples()[1], 16384);
        assert_eq!(buffer.samples()[2], Sample::MIN);
        assert_eq!(buffer.samples()[3], Sample::MAX);

        let stereo_spec = hound::WavSpec { channels: 2, ..wav::WAV_SPEC };
        let mut bytes = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut bytes, stereo_spec).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.finalize().unwrap();
        }
        assert!(matches!(wav::decode_wav(bytes.get_ref()), Err(Error::Wav(_))));
    }

    #[test]
    fn play_requires_configuration() {
        init_logging();
        let (output, started) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, silent_input());
        assert!(!session.is_configured());
        assert!(matches!(session.play(), Err(Error::NotConfigured)));
        assert!(!session.state().is_playing);
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn configure_sets_silent_loop() {
        init_logging();
        let (output, _) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, silent_input());
        assert_eq!(session.configure(80, 0, 10).unwrap(), 12000);
        assert_eq!(session.loop_length_ms(), Some(12000));

        let buffer = session.buffer().unwrap();
        assert_eq!(buffer.len(), 529200);
        assert!(buffer.samples().iter().all(|&s| s == 0));
        assert_eq!(session.undo_depth(), 0);
    }

    #[test]
    fn invalid_configure_keeps_session() {
        init_logging();
        let (output, _) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, silent_input());
        session.configure(120, 0, 2).unwrap();
        session.play().unwrap();

        assert!(matches!(session.configure(0, 0, 10), Err(Error::InvalidConfiguration(_))));
        assert_eq!(session.loop_length_ms(), Some(2000));
        assert!(session.state().is_playing);
    }

    #[test]
    fn play_twice_is_refused() {
        init_logging();
        let (output, started) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, silent_input());
        session.configure(120, 0, 2).unwrap();
        session.play().unwrap();
        wait_for("first iteration", || started.load(Ordering::SeqCst) == 1);

        assert!(matches!(session.play(), Err(Error::AlreadyPlaying)));
        assert!(session.state().is_playing);

        session.stop();
        assert!(!session.state().is_playing);
        assert_eq!(session.state().position, 0.0);

        // Stopped playback can be started again.
        session.play().unwrap();
        wait_for("second start", || started.load(Ordering::SeqCst) == 2);
    }

    #[test]
    fn record_requires_playback() {
        init_logging();
        let (output, _) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, silent_input());
        session.configure(80, 0, 10).unwrap();

        assert!(matches!(session.toggle_record(), Err(Error::NotPlaying)));
        assert_eq!(session.undo_depth(), 0);
        assert!(!session.state().is_recording);
    }

    #[test]
    fn overdub_then_undo() {
        init_logging();
        let script = ramp(ms_to_samples(2000, SAMPLE_RATE));
        let full_frames = script.len() / TEST_CONFIG.frame_size;
        let (output, _) = manual_output();
        let (input, frames_read) = scripted_input(script.clone());
        let mut session = Session::new(TEST_CONFIG, output, input);

        session.configure(80, 0, 10).unwrap();
        session.play().unwrap();

        assert_eq!(session.toggle_record().unwrap(), RecordToggle::Started { position_ms: 0 });
        assert!(session.state().is_recording);
        assert_eq!(session.undo_depth(), 1);

        wait_for("capture", || frames_read.load(Ordering::SeqCst) == full_frames);
        assert_eq!(session.toggle_record().unwrap(), RecordToggle::Stopped { samples: script.len() });
        assert!(!session.state().is_recording);
        assert!(session.state().is_playing);

        let buffer = session.buffer().unwrap();
        assert_eq!(buffer.len(), 529200);
        assert_eq!(&buffer.samples()[..script.len()], &script[..]);
        assert!(buffer.samples()[script.len()..].iter().all(|&s| s == 0));

        session.undo().unwrap();
        assert_eq!(*session.buffer().unwrap(), LoopBuffer::silent(12000));
        assert!(matches!(session.undo(), Err(Error::NothingToUndo)));
    }

    #[test]
    fn overdub_past_the_end_extends_the_loop() {
        init_logging();
        let script = ramp(ms_to_samples(1500, SAMPLE_RATE));
        let full_frames = script.len() / TEST_CONFIG.frame_size;
        let (output, _) = manual_output();
        let (input, frames_read) = scripted_input(script.clone());
        let mut session = Session::new(TEST_CONFIG, output, input);

        // 240 bpm, 1 s: a one bar loop.
        session.configure(240, 0, 1).unwrap();
        session.play().unwrap();
        session.start_recording().unwrap();
        wait_for("capture", || frames_read.load(Ordering::SeqCst) == full_frames);
        session.stop_recording().unwrap();

        let buffer = session.buffer().unwrap();
        assert_eq!(buffer.len(), script.len());
        assert_eq!(buffer.samples(), &script[..]);
        assert_eq!(session.loop_length_ms(), Some(1000));
    }

    #[test]
    fn stop_discards_the_take() {
        init_logging();
        let script = ramp(20 * TEST_CONFIG.frame_size);
        let (output, _) = manual_output();
        let (input, frames_read) = scripted_input(script);
        let mut session = Session::new(TEST_CONFIG, output, input);

        session.configure(120, 0, 2).unwrap();
        session.play().unwrap();
        session.toggle_record().unwrap();
        wait_for("capture", || frames_read.load(Ordering::SeqCst) == 20);

        session.stop();
        let state = session.state();
        assert!(!state.is_playing);
        assert!(!state.is_recording);
        assert!(session.buffer().unwrap().samples().iter().all(|&s| s == 0));
        assert_eq!(session.undo_depth(), 1);
    }

    #[test]
    fn failed_capture_leaves_buffer_unchanged() {
        init_logging();
        let (output, _) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, Arc::new(BrokenInput));

        session.configure(120, 0, 2).unwrap();
        session.play().unwrap();
        session.start_recording().unwrap();
        wait_for("capture failure", || !session.state().is_recording);

        assert!(matches!(session.stop_recording(), Err(Error::RecordingFailed(_))));
        assert_eq!(*session.buffer().unwrap(), LoopBuffer::silent(2000));
        assert!(session.state().is_playing);

        // The next take starts cleanly.
        assert!(matches!(session.toggle_record(), Ok(RecordToggle::Started { .. })));
    }

    #[test]
    fn speed_change_applies_at_next_iteration() {
        init_logging();
        let played = Arc::new(Mutex::new(Vec::new()));
        let output = Arc::new(InstantOutput { played: played.clone() });
        let mut session = Session::new(TEST_CONFIG, output, silent_input());

        session.configure(240, 0, 1).unwrap();
        session.play().unwrap();
        wait_for("normal iteration", || played.lock().unwrap().len() >= 2);

        assert_eq!(session.set_speed(1.0).unwrap().ratio(), 2.0);
        wait_for("fast iteration", || played.lock().unwrap().contains(&22050));
        session.stop();

        let played = played.lock().unwrap();
        let first_fast = played.iter().position(|&len| len == 22050).unwrap();
        assert!(first_fast >= 2);
        assert!(played[..first_fast].iter().all(|&len| len == 44100));
        assert!(played[first_fast..].iter().all(|&len| len == 22050));
    }

    #[test]
    fn out_of_range_speed_is_refused() {
        init_logging();
        let (output, _) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, silent_input());
        assert!(matches!(session.set_speed(7.0), Err(Error::InvalidConfiguration(_))));
        assert_eq!(session.state().speed, SpeedRatio::normal());
        assert_eq!(session.set_speed(-1.0).unwrap().ratio(), 0.5);
        assert_eq!(session.state().speed.ratio(), 0.5);
    }

    #[test]
    fn save_writes_the_loop() {
        init_logging();
        let (output, _) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, silent_input());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.wav");

        assert!(matches!(session.save(&path), Err(Error::NotConfigured)));
        assert!(!path.exists());

        session.configure(120, 0, 2).unwrap();
        session.save(&path).unwrap();
        assert_eq!(wav::open_wav(&path).unwrap(), *session.buffer().unwrap());
        assert_eq!(wav::decode_wav(&session.export().unwrap()).unwrap().len(), 88200);
    }

    #[test]
    fn reconfigure_clears_history_and_stops() {
        init_logging();
        let script = ramp(4 * TEST_CONFIG.frame_size);
        let (output, _) = manual_output();
        let (input, frames_read) = scripted_input(script);
        let mut session = Session::new(TEST_CONFIG, output, input);

        session.configure(120, 0, 2).unwrap();
        session.play().unwrap();
        session.start_recording().unwrap();
        wait_for("capture", || frames_read.load(Ordering::SeqCst) == 4);
        session.stop_recording().unwrap();
        assert_eq!(session.undo_depth(), 1);

        assert_eq!(session.configure(240, 0, 1).unwrap(), 1000);
        assert_eq!(session.undo_depth(), 0);
        assert!(!session.state().is_playing);
        assert_eq!(*session.buffer().unwrap(), LoopBuffer::silent(1000));
    }

    #[test]
    fn stretch_can_be_interrupted() {
        let input = sine(440.0, 44100);
        let stopped = AtomicBool::new(true);
        assert_eq!(stretch_interruptible(&input, SAMPLE_RATE, 0.5, &stopped).unwrap(), None);

        let running = AtomicBool::new(false);
        let output = stretch_interruptible(&input, SAMPLE_RATE, 0.5, &running).unwrap().unwrap();
        assert_eq!(output, stretch(&input, SAMPLE_RATE, 0.5).unwrap());

        // Bad input is still an error, not an interruption.
        assert!(stretch_interruptible(&input, SAMPLE_RATE, 0.0, &stopped).is_err());
    }

    #[test]
    fn stop_does_not_wait_for_a_long_stretch() {
        init_logging();
        let (output, started) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, silent_input());

        // One minute at 1/6 speed: the stretch takes far longer than a poll.
        session.configure(120, 1, 0).unwrap();
        session.set_speed(-5.0).unwrap();
        session.play().unwrap();
        sleep(Duration::from_millis(50));

        let start = Instant::now();
        session.stop();
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(100), "stop took {:?}", elapsed);
        assert!(!session.state().is_playing);
        assert_eq!(started.load(Ordering::SeqCst), 0);

        session.play().unwrap();
        sleep(Duration::from_millis(50));
        let start = Instant::now();
        assert_eq!(session.configure(120, 0, 2).unwrap(), 2000);
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(100), "configure took {:?}", elapsed);
    }

    #[test]
    fn overdub_lands_at_playback_position() {
        init_logging();
        let script = ramp(ms_to_samples(500, SAMPLE_RATE));
        let full_frames = script.len() / TEST_CONFIG.frame_size;
        let cursor = Arc::new(AtomicUsize::new(264600));
        let output = Arc::new(PositionedOutput { cursor: cursor.clone() });
        let (input, frames_read) = scripted_input(script.clone());
        let mut session = Session::new(TEST_CONFIG, output, input);

        session.configure(80, 0, 10).unwrap();
        session.play().unwrap();
        wait_for("half way", || session.state().position == 0.5);
        assert_eq!(session.state().progress_percent(), 50);

        assert_eq!(session.toggle_record().unwrap(), RecordToggle::Started { position_ms: 6000 });

        // Playback moves on while the take runs; the insertion point does not.
        cursor.store(396900, Ordering::SeqCst);
        wait_for("three quarters", || session.state().position == 0.75);
        wait_for("capture", || frames_read.load(Ordering::SeqCst) == full_frames);
        session.toggle_record().unwrap();

        let buffer = session.buffer().unwrap();
        assert_eq!(buffer.len(), 529200);
        assert_eq!(buffer.samples().iter().position(|&s| s != 0), Some(264600));
        assert_eq!(&buffer.samples()[264600..264600 + script.len()], &script[..]);
        assert!(buffer.samples()[264600 + script.len()..].iter().all(|&s| s == 0));
    }

    #[test]
    fn undo_is_refused_during_a_take() {
        init_logging();
        let script = ramp(4 * TEST_CONFIG.frame_size);
        let (output, _) = manual_output();
        let (input, frames_read) = scripted_input(script.clone());
        let mut session = Session::new(TEST_CONFIG, output, input);

        session.configure(120, 0, 2).unwrap();
        session.play().unwrap();
        session.toggle_record().unwrap();

        assert!(matches!(session.undo(), Err(Error::RecordingInProgress)));
        assert!(Error::RecordingInProgress.is_notice());
        assert_eq!(session.undo_depth(), 1);
        assert!(session.state().is_recording);

        wait_for("capture", || frames_read.load(Ordering::SeqCst) == 4);
        assert!(session.check_recording().is_none());
        session.toggle_record().unwrap();
        assert_eq!(&session.buffer().unwrap().samples()[..script.len()], &script[..]);

        // The take's own snapshot undoes it.
        session.undo().unwrap();
        assert_eq!(*session.buffer().unwrap(), LoopBuffer::silent(2000));
        assert!(matches!(session.undo(), Err(Error::NothingToUndo)));
    }

    #[test]
    fn failed_capture_is_reported_without_a_toggle() {
        init_logging();
        let (output, _) = manual_output();
        let mut session = Session::new(TEST_CONFIG, output, Arc::new(BrokenInput));

        session.configure(120, 0, 2).unwrap();
        session.play().unwrap();
        assert!(session.check_recording().is_none());
        session.start_recording().unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let failure = loop {
            if let Some(error) = session.check_recording() {
                break error;
            }
            assert!(Instant::now() < deadline, "capture failure was never reported");
            sleep(Duration::from_millis(1));
        };
        assert!(matches!(failure, Error::RecordingFailed(_)));
        assert!(!session.state().is_recording);
        assert!(session.check_recording().is_none());

        // The failed take is closed, so its snapshot can be undone.
        session.undo().unwrap();
        assert_eq!(*session.buffer().unwrap(), LoopBuffer::silent(2000));
    }
}
