use std::path::Path;

/// Output canvas size
pub const WIDTH: u32 = 1280;
pub const HEIGHT: u32 = 720;

pub const FONT_SIZE: u32 = 48;
const LINE_SPACING: u32 = 12;

/// Characters that fit on one line at `FONT_SIZE` with a 50px margin per side
pub const MAX_LINE_CHARS: usize = ((WIDTH - 100) / (FONT_SIZE * 55 / 100)) as usize;

/// Background and text colours of a slide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: (u8, u8, u8),
    pub text: (u8, u8, u8),
}

impl Palette {
    /// Resolve a colour scheme name; unknown names fall back to `blue-gradient`.
    /// The `dark` template always renders on black.
    pub fn resolve(template: &str, color_scheme: &str) -> Self {
        let background = match (template, color_scheme) {
            ("dark", _) => (0, 0, 0),
            (_, "sunset") => (245, 158, 11),
            (_, "forest") => (5, 150, 105),
            (_, "monochrome") => (55, 65, 81),
            _ => (79, 70, 229),
        };

        Self {
            background,
            text: (255, 255, 255),
        }
    }

    pub fn background_hex(&self) -> String {
        hex(self.background)
    }

    pub fn text_hex(&self) -> String {
        hex(self.text)
    }
}

fn hex((r, g, b): (u8, u8, u8)) -> String {
    format!("0x{:02X}{:02X}{:02X}", r, g, b)
}

/// One slide: wrapped text shown between `start` and `end` seconds
#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Split text into sentences on `.`; text without any sentence becomes one slide
pub fn split_sentences(text: &str) -> Vec<String> {
    let sentences: Vec<String> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if sentences.is_empty() {
        vec![text.trim().to_string()]
    } else {
        sentences
    }
}

/// Greedy word wrap. A word longer than `max_chars` gets a line of its own.
pub fn wrap_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };

        if needed <= max_chars || current.is_empty() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Lay the text out as equally long slides covering `duration_secs`
pub fn layout(text: &str, duration_secs: u32) -> Vec<Slide> {
    let sentences = split_sentences(text);
    let per_slide = f64::from(duration_secs) / sentences.len() as f64;

    sentences
        .iter()
        .enumerate()
        .map(|(i, sentence)| Slide {
            text: wrap_words(&format!("{}.", sentence.trim_end_matches('.')), MAX_LINE_CHARS)
                .join("\n"),
            start: i as f64 * per_slide,
            end: (i + 1) as f64 * per_slide,
        })
        .collect()
}

/// Single quotes would end the quoted filter value
fn quote_safe(value: &str) -> String {
    value.replace('\'', "")
}

/// Build a `drawtext` filter chain, one filter per slide text file
pub fn drawtext_filter(slides: &[(&Path, &Slide)], palette: &Palette, font_family: &str) -> String {
    slides
        .iter()
        .map(|(textfile, slide)| {
            format!(
                "drawtext=textfile='{}':expansion=none:font='{}':fontsize={}:fontcolor={}:line_spacing={}:\
                 x=(w-text_w)/2:y=(h-text_h)/2:shadowcolor=black@0.5:shadowx=2:shadowy=2:\
                 enable='between(t,{:.3},{:.3})'",
                quote_safe(&textfile.to_string_lossy()),
                quote_safe(font_family),
                FONT_SIZE,
                palette.text_hex(),
                LINE_SPACING,
                slide.start,
                slide.end,
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn splits_on_periods_and_drops_empty_sentences() {
        assert_eq!(
            split_sentences("Hello world. This is a test.  "),
            vec!["Hello world", "This is a test"]
        );
        assert_eq!(split_sentences("..."), vec!["..."]);
        assert_eq!(split_sentences("no period"), vec!["no period"]);
    }

    #[test]
    fn wraps_words_within_limit() {
        let lines = wrap_words("the quick brown fox jumps over the lazy dog", 15);
        assert_eq!(lines, vec!["the quick brown", "fox jumps over", "the lazy dog"]);
        assert!(lines.iter().all(|l| l.chars().count() <= 15));
    }

    #[test]
    fn overlong_word_gets_its_own_line() {
        let lines = wrap_words("a supercalifragilistic b", 5);
        assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn layout_splits_duration_evenly() {
        let slides = layout("One. Two. Three. Four.", 40);
        assert_eq!(slides.len(), 4);
        assert_eq!(slides[0].text, "One.");
        assert_eq!(slides[0].start, 0.0);
        assert_eq!(slides[3].start, 30.0);
        assert_eq!(slides[3].end, 40.0);
    }

    #[test]
    fn unknown_scheme_falls_back_to_blue() {
        assert_eq!(Palette::resolve("modern", "neon").background_hex(), "0x4F46E5");
        assert_eq!(Palette::resolve("modern", "sunset").background_hex(), "0xF59E0B");
        assert_eq!(Palette::resolve("dark", "sunset").background_hex(), "0x000000");
    }

    #[test]
    fn drawtext_filter_enables_each_slide_in_its_window() {
        let slides = layout("First. Second.", 10);
        let files = [PathBuf::from("/tmp/s0.txt"), PathBuf::from("/tmp/s1.txt")];
        let pairs: Vec<(&Path, &Slide)> = files.iter().map(PathBuf::as_path).zip(slides.iter()).collect();

        let filter = drawtext_filter(&pairs, &Palette::resolve("modern", "forest"), "roboto");

        assert_eq!(filter.matches("drawtext=").count(), 2);
        assert!(filter.contains("textfile='/tmp/s0.txt'"));
        assert!(filter.contains("enable='between(t,0.000,5.000)'"));
        assert!(filter.contains("enable='between(t,5.000,10.000)'"));
        assert!(filter.contains("fontcolor=0xFFFFFF"));
        assert_eq!(filter.matches("expansion=none").count(), 2);
    }

    #[test]
    fn percent_signs_are_drawn_literally() {
        let slides = layout("Save 50% today. Then %{pts} more.", 10);
        let files = [PathBuf::from("/tmp/s0.txt"), PathBuf::from("/tmp/s1.txt")];
        let pairs: Vec<(&Path, &Slide)> = files.iter().map(PathBuf::as_path).zip(slides.iter()).collect();

        let filter = drawtext_filter(&pairs, &Palette::resolve("modern", "blue-gradient"), "roboto");

        assert_eq!(slides[0].text, "Save 50% today.");
        assert!(filter
            .split(',')
            .filter(|f| f.starts_with("drawtext="))
            .all(|f| f.contains(":expansion=none:")));
    }
}
