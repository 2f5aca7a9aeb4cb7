use super::{Args, FilterContext, FilterRegistry, SkipReason};
use crate::imaging::{Color, Raster};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register("noise", "level(0..255)[,seed]", noise);
}

/// Roughly half of the pixels get one random signed delta in `-level..=level`
/// added to every channel, alpha included. Each channel clamps on its own.
pub(crate) fn add_noise<R: Rng>(image: &mut Raster, level: i32, rng: &mut R) {
    if level == 0 {
        return;
    }
    image.map_pixels(|c| {
        if !rng.gen_bool(0.5) {
            return c;
        }
        let delta = rng.gen_range(-level..=level);
        let nudge = |v: u8| (v as i32 + delta).clamp(0, 255) as u8;
        Color::rgba(nudge(c.r), nudge(c.g), nudge(c.b), nudge(c.a))
    });
}

fn noise(image: &mut Raster, args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let level = args.int_in(0, 30, 0, 255)? as i32;
    match args.raw(1) {
        Some(_) => {
            let seed = args.int(1, "seed")? as u64;
            add_noise(image, level, &mut StdRng::seed_from_u64(seed));
        }
        None => add_noise(image, level, &mut rand::thread_rng()),
    }
    Ok(())
}
