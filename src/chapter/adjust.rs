use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

use crate::error::{MergeError, Result};
use crate::media::Silence;

use super::Chapter;

/// Desired and maximum chapter lengths parsed from the `"D[,M]"` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterLengthOptions {
    /// Preferred split point distance from the chapter start; zero means
    /// "only cap at max, no preferred point".
    pub desired: Duration,
    /// Hard cap above which a chapter is considered too long.
    pub max: Duration,
}

impl ChapterLengthOptions {
    /// Parse `"D"` (desired = max = D) or `"D,M"`. Returns `None` when the
    /// resulting max is zero, which disables length adjustment.
    pub fn parse(value: &str) -> Result<Option<Self>> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let mut parts = value.splitn(2, ',');
        let desired_secs: u64 = parts
            .next()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| invalid(value))?;
        let max_secs: u64 = match parts.next() {
            Some(part) => part.trim().parse().map_err(|_| invalid(value))?,
            None => desired_secs,
        };

        if max_secs == 0 {
            return Ok(None);
        }
        if max_secs < desired_secs {
            return Err(MergeError::InvalidInput(format!(
                "max chapter length {}s must not be smaller than desired length {}s",
                max_secs, desired_secs
            )));
        }

        Ok(Some(Self {
            desired: Duration::from_secs(desired_secs),
            max: Duration::from_secs(max_secs),
        }))
    }

    /// Distance from the chapter start where a split is preferred.
    fn split_target(&self) -> Duration {
        if self.desired.is_zero() {
            self.max
        } else {
            self.desired
        }
    }
}

fn invalid(value: &str) -> MergeError {
    MergeError::InvalidInput(format!(
        "invalid max chapter length '{}', expected seconds as 'D' or 'D,M'",
        value
    ))
}

/// Split every chapter longer than the cap at the silence whose midpoint lies
/// nearest to the preferred split point, restricted to the chapter's own span.
/// Both halves keep the original title and are re-examined; a chapter with no
/// usable silence candidate is kept as-is.
pub fn adjust_chapters(
    chapters: Vec<Chapter>,
    silences: &[Silence],
    options: &ChapterLengthOptions,
) -> Vec<Chapter> {
    if silences.is_empty() {
        debug!("no silences detected, skipping chapter length adjustment");
        return chapters;
    }

    let mut queue: VecDeque<Chapter> = chapters.into();
    let mut result = Vec::with_capacity(queue.len());

    while let Some(chapter) = queue.pop_front() {
        if chapter.length <= options.max {
            result.push(chapter);
            continue;
        }

        match best_split_point(&chapter, silences, options.split_target()) {
            Some(split) => {
                debug!(
                    "splitting chapter '{}' ({:?} long) at {:?}",
                    chapter.title, chapter.length, split
                );
                let first = Chapter::new(chapter.start, split - chapter.start, chapter.title.clone());
                let second = Chapter::new(split, chapter.end() - split, chapter.title);
                queue.push_front(second);
                queue.push_front(first);
            }
            None => result.push(chapter),
        }
    }

    result
}

/// Silence midpoint strictly inside the chapter span that is closest to
/// `chapter.start + target`.
fn best_split_point(chapter: &Chapter, silences: &[Silence], target: Duration) -> Option<Duration> {
    let preferred = chapter.start + target;

    silences
        .iter()
        .map(Silence::midpoint)
        .filter(|midpoint| *midpoint > chapter.start && *midpoint < chapter.end())
        .min_by_key(|midpoint| distance(*midpoint, preferred))
}

fn distance(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}
