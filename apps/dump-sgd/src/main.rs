// This file is part of OpenSGD.
//
// OpenSGD is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// OpenSGD is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with OpenSGD.  If not, see <http://www.gnu.org/licenses/>.

mod out;

use anyhow::{ensure, Context, Result};
use log::trace;
use overlay::{render_base, render_labels, render_sets, TextPainter};
use pal::{Palette, OUTPUT_COLORS, WORKING_COLORS};
use sgd::Sgd;
use std::{fs, path::Path};
use structopt::StructOpt;

const LABEL_FONT_SIZE: f32 = 18.0;

/// Decode SGD charts into PNG files, with optional per-set highlight
/// pictures
#[derive(Debug, StructOpt)]
struct Opt {
    /// Also output cropped pictures of each selection set
    #[structopt(short = "c")]
    crop: bool,

    /// Also output full pictures of each selection set
    #[structopt(short = "f")]
    full: bool,

    /// Load alternative 8 or 16 color palette from file
    #[structopt(short = "p")]
    palette: Option<String>,

    /// Set PNG compression level (0-9)
    #[structopt(short = "z")]
    compression: Option<i32>,

    /// Set destination directory
    #[structopt(short = "o", default_value = ".")]
    out_dir: String,

    /// One or more SGD files to process
    inputs: Vec<String>,
}

fn main() {
    env_logger::init();
    let opt = match Opt::from_iter_safe(std::env::args()) {
        Ok(opt) => opt,
        Err(err) => {
            // Covers -h as well as anything unrecognized: show usage and
            // exit cleanly.
            eprintln!("{}", err.message);
            std::process::exit(0);
        }
    };
    if opt.inputs.is_empty() {
        let mut app = Opt::clap();
        let _ = app.write_long_help(&mut std::io::stderr());
        eprintln!();
        std::process::exit(0);
    }
    if let Err(err) = run(&opt) {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(opt: &Opt) -> Result<()> {
    if let Some(level) = opt.compression {
        ensure!((0..=9).contains(&level), "bad PNG compression level");
    }
    let palette = match &opt.palette {
        Some(path) => {
            Palette::from_text_file(path).with_context(|| path.clone())?
        }
        None => Palette::substitute(),
    };
    let text = TextPainter::bold_sans(LABEL_FONT_SIZE);

    for input in &opt.inputs {
        let input = fix_separators(input);
        process_chart(&input, &palette, &text, opt).with_context(|| input.clone())?;
    }
    Ok(())
}

fn process_chart(input: &str, palette: &Palette, text: &TextPainter, opt: &Opt) -> Result<()> {
    let data = sgd::load(Path::new(input))?;
    let mut doc = Sgd::from_bytes(&data, palette)?;
    trace!("{}: {}x{}", input, doc.width(), doc.height());

    let labels = render_labels(&doc, text)?;
    let base = render_base(&doc, &labels);
    let (width, height) = (doc.width() as usize, doc.height() as usize);

    let file_name = input.rsplit('/').next().unwrap_or(input);
    let mut out_path = format!("{}/{}", fix_separators(&opt.out_dir), file_name);
    if let Some(token) = file_name.get(..3) {
        out_path = out_path.replace("###", token);
    }
    let stem = strip_extension(&out_path);

    let base_png = format!("{}.png", stem);
    make_parents(&base_png)?;
    out::write_indexed(
        &base_png,
        &base,
        width,
        0,
        0,
        width,
        height,
        palette.png_bytes(WORKING_COLORS),
        opt.compression,
    )?;

    if opt.full || opt.crop {
        let base_name = stem.rsplit('/').next().unwrap_or(&stem).to_owned();
        if opt.full {
            fs::create_dir_all(format!("{}/full", stem))?;
        }
        if opt.crop {
            fs::create_dir_all(format!("{}/crop", stem))?;
        }
        for pass in render_sets(&mut doc, &base, opt.crop)? {
            if opt.full {
                out::write_indexed(
                    &format!("{}/full/{}_{}.png", stem, base_name, pass.name),
                    &pass.pixels,
                    width,
                    0,
                    0,
                    width,
                    height,
                    palette.png_bytes(OUTPUT_COLORS),
                    opt.compression,
                )?;
            }
            if opt.crop {
                if let Some(bounds) = pass.bounds {
                    out::write_indexed(
                        &format!("{}/crop/{}_{}.png", stem, base_name, pass.name),
                        &pass.pixels,
                        width,
                        bounds.min_x as usize,
                        bounds.min_y as usize,
                        bounds.width() as usize,
                        bounds.height() as usize,
                        palette.png_bytes(OUTPUT_COLORS),
                        opt.compression,
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn fix_separators(path: &str) -> String {
    if cfg!(windows) {
        path.replace('\\', "/")
    } else {
        path.to_owned()
    }
}

/// Drop the extension from the final path component, if any.
fn strip_extension(path: &str) -> String {
    let component_at = path.rfind('/').map(|at| at + 1).unwrap_or(0);
    match path[component_at..].rfind('.') {
        Some(dot) => path[..component_at + dot].to_owned(),
        None => path.to_owned(),
    }
}

fn make_parents(path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("couldn't create {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_strip_from_the_final_component_only() {
        assert_eq!(strip_extension("out/chart.sgd"), "out/chart");
        assert_eq!(strip_extension("out.d/chart"), "out.d/chart");
        assert_eq!(strip_extension("out/chart.sgd.gz"), "out/chart.sgd");
        assert_eq!(strip_extension("chart.sgd"), "chart");
    }

    #[test]
    fn template_tokens_take_the_input_prefix() {
        let file_name = "n47e011.sgd";
        let mut out_path = format!("{}/{}", "maps/###", file_name);
        if let Some(token) = file_name.get(..3) {
            out_path = out_path.replace("###", token);
        }
        assert_eq!(out_path, "maps/n47/n47e011.sgd");
    }

    #[test]
    fn short_names_leave_templates_alone() {
        let file_name = "ab";
        let mut out_path = format!("{}/{}", "maps/###", file_name);
        if let Some(token) = file_name.get(..3) {
            out_path = out_path.replace("###", token);
        }
        assert_eq!(out_path, "maps/###/ab");
    }
}
