// Renders a moving rainbow.
//
// The strip is configured from the environment, e.g.
//
//     WS281X_COUNT=60 WS281X_STRIP_TYPE=WS2811_STRIP_GRB WS281X_BRIGHTNESS=20 \
//         cargo run --example rainbow

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use palette::LinSrgb;
use ws281x_rpi::{teardown, InitOptions, Ws281x};

mod common;
use common::{effects, stderr_log};

const FRAME_TIME: Duration = Duration::from_millis(16);

fn main() -> ws281x_rpi::Result<()> {
    stderr_log::init(log::LevelFilter::Debug);

    let options = InitOptions::from_env()?;
    log::info!("Options: {:?}", options);

    let mut strip = Ws281x::detect();
    strip.init_with(&options)?;

    let strip = Arc::new(Mutex::new(strip));
    let _hook = teardown::install(Arc::clone(&strip))?;

    let mut framebuffer = vec![LinSrgb::new(0u8, 0, 0); options.count as usize];
    let start = Instant::now();

    loop {
        let t = start.elapsed().as_millis() as u32;
        effects::rainbow(t, &mut framebuffer);

        {
            let mut strip = strip.lock().unwrap_or_else(PoisonError::into_inner);
            strip.write(&framebuffer)?;
            strip.show()?;
        }

        thread::sleep(FRAME_TIME);
    }
}
