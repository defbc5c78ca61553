//! Microphone probe: capture from the default input device, print a level
//! meter, optionally dump the take to a WAV file. Useful for checking that
//! permissions, device selection and levels are sane before a real session.

#[cfg(not(feature = "audio-cpal"))]
fn main() {
    eprintln!("mic_probe requires the 'audio-cpal' feature");
    std::process::exit(1);
}

#[cfg(feature = "audio-cpal")]
fn main() {
    if let Err(e) = run() {
        eprintln!("mic_probe failed: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(feature = "audio-cpal")]
fn run() -> anyhow::Result<()> {
    use anyhow::Context;
    use eburon_live::audio::{block_rms, MicCapture, BLOCK_SAMPLES, VOLUME_GAIN};
    use eburon_live::buffering::{create_capture_ring, Consumer};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Debug)]
    struct Args {
        seconds: u64,
        wav: Option<PathBuf>,
    }

    fn parse_args() -> anyhow::Result<Args> {
        let mut seconds: u64 = 5;
        let mut wav: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--seconds" => {
                    let Some(v) = it.next() else {
                        anyhow::bail!("missing value for --seconds");
                    };
                    seconds = v
                        .parse::<u64>()
                        .context("invalid value for --seconds")?
                        .clamp(1, 300);
                }
                "--wav" => {
                    let Some(v) = it.next() else {
                        anyhow::bail!("missing value for --wav");
                    };
                    wav = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p eburon-live --bin mic_probe -- \\
  [--seconds <n>] [--wav <file.wav>]"
                    );
                    std::process::exit(0);
                }
                other => anyhow::bail!("unknown argument: {other}"),
            }
        }
        Ok(Args { seconds, wav })
    }

    fn write_wav(path: &PathBuf, samples: &[f32], sample_rate: u32) -> anyhow::Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("cannot create {}", path.display()))?;
        for s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)?;
        }
        writer.finalize().context("finalize wav")?;
        Ok(())
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eburon_live=info".parse().expect("static filter")),
        )
        .init();

    let args = parse_args()?;

    let (producer, mut consumer) = create_capture_ring();
    let running = Arc::new(AtomicBool::new(true));
    let capture = MicCapture::open_default(producer, Arc::clone(&running))
        .context("failed to open microphone")?;
    println!(
        "capturing at {} hz for {} s (ctrl-c to abort)",
        capture.sample_rate, args.seconds
    );

    let mut take: Vec<f32> = Vec::new();
    let mut scratch = vec![0f32; BLOCK_SAMPLES];
    let mut block: Vec<f32> = Vec::with_capacity(BLOCK_SAMPLES * 2);
    let started = Instant::now();

    while started.elapsed() < Duration::from_secs(args.seconds) {
        std::thread::sleep(Duration::from_millis(50));
        loop {
            let n = consumer.pop_slice(&mut scratch);
            if n == 0 {
                break;
            }
            block.extend_from_slice(&scratch[..n]);
            if args.wav.is_some() {
                take.extend_from_slice(&scratch[..n]);
            }
        }
        while block.len() >= BLOCK_SAMPLES {
            let chunk: Vec<f32> = block.drain(..BLOCK_SAMPLES).collect();
            let level = (block_rms(&chunk) * VOLUME_GAIN).min(1.0);
            let bars = (level * 40.0) as usize;
            println!("[{:<40}] {level:.3}", "#".repeat(bars));
        }
    }
    capture.stop();

    if let Some(path) = &args.wav {
        write_wav(path, &take, capture.sample_rate)?;
        println!("wrote {} samples to {}", take.len(), path.display());
    }
    Ok(())
}
