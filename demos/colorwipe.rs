// Wipes red, green and blue across a 16 pixel GRB strip until interrupted.
//
// Run as root on a Raspberry Pi with the strip on GPIO 18. Elsewhere, a
// simulated strip is used and the frames are only logged.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use ws281x_rpi::{teardown, StripConfig, StripType, Ws281x};

mod common;
use common::{effects::WIPE_COLORS, stderr_log};

const NUM_LEDS: usize = 16;
const WAIT_TIME: Duration = Duration::from_millis(50);

fn main() -> ws281x_rpi::Result<()> {
    stderr_log::init(log::LevelFilter::Info);

    let mut strip = Ws281x::detect();
    strip.init(
        StripConfig::builder(NUM_LEDS)
            .strip_type(StripType::Ws2811Grb)
            .build()?,
    )?;

    // Just so you don't get blind
    strip.set_brightness(5)?;

    if strip.is_simulated() {
        log::warn!("No hardware access, frames go to a simulated strip.");
    }

    let strip = Arc::new(Mutex::new(strip));
    let _hook = teardown::install(Arc::clone(&strip))?;

    log::info!("Wiping colors, press Ctrl+C to stop.");
    loop {
        for color in WIPE_COLORS {
            for position in 0..NUM_LEDS {
                {
                    let mut strip = strip.lock().unwrap_or_else(PoisonError::into_inner);
                    strip.set_pixel_color(position, color)?;
                    strip.show()?;
                }
                thread::sleep(WAIT_TIME);
            }
            log::debug!("Wiped {:?}.", color);
        }
    }
}
