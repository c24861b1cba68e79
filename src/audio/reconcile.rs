//! Qué suena después de que una pista termina.
//!
//! Prioridad fija: loop de canción, cola (con reinserción en loop de cola),
//! autoplay, y por último quedarse conectado sin reproducir.

use tracing::{debug, info};

use crate::{
    audio::queue::{LoopMode, TrackQueue},
    sources::{MetadataResolver, StreamDescriptor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceCause {
    NaturalEnd,
    /// Salto manual; el loop de canción no aplica
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    Replay,
    Play(StreamDescriptor),
    Autoplay { seed: StreamDescriptor },
    Idle,
}

/// Decide el siguiente paso y deja la cola lista para él
pub fn next_step(
    queue: &mut TrackQueue,
    finished: &StreamDescriptor,
    loop_mode: LoopMode,
    autoplay: bool,
    cause: AdvanceCause,
) -> NextStep {
    if loop_mode == LoopMode::Single && cause == AdvanceCause::NaturalEnd {
        return NextStep::Replay;
    }

    // Reinsertar antes de mirar la cola: una sola pista en loop de cola se repite
    if loop_mode == LoopMode::Queue {
        queue.requeue(finished.clone());
    }

    if let Some(next) = queue.dequeue_front() {
        return NextStep::Play(next);
    }

    if autoplay {
        return NextStep::Autoplay {
            seed: finished.clone(),
        };
    }

    NextStep::Idle
}

/// Busca una pista relacionada con `seed` para el autoplay.
///
/// Elige el primer resultado con título distinto que se pueda resolver.
/// Los fallos se absorben: `None` significa quedarse sin reproducir.
pub async fn autoplay_candidate(
    resolver: &dyn MetadataResolver,
    seed: &StreamDescriptor,
    limit: usize,
) -> Option<StreamDescriptor> {
    let candidates = resolver.search(&seed.title, limit).await;
    debug!(
        "🎲 Autoplay: {} candidatos para '{}'",
        candidates.len(),
        seed.title
    );

    for candidate in candidates.iter().filter(|c| c.title != seed.title) {
        match resolver.resolve(candidate.lookup_key()).await {
            Ok(descriptor) => {
                info!("🎲 Autoplay eligió: {}", descriptor.title);
                return Some(descriptor);
            }
            Err(e) => debug!("Autoplay descartó '{}': {}", candidate.title, e),
        }
    }

    debug!("🎲 Autoplay sin candidatos válidos");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::PlaybackError,
        sources::{MockMetadataResolver, SearchResult},
    };
    use pretty_assertions::assert_eq;

    fn song(title: &str) -> StreamDescriptor {
        StreamDescriptor::new(format!("https://cdn/{}", title), title)
    }

    fn queue_of(titles: &[&str]) -> TrackQueue {
        let mut queue = TrackQueue::new(100);
        queue.extend(titles.iter().map(|t| song(t)).collect());
        queue
    }

    fn titles(queue: &TrackQueue) -> Vec<String> {
        queue.iter().map(|d| d.title.clone()).collect()
    }

    #[test]
    fn test_single_loop_replays_on_natural_end() {
        let mut queue = queue_of(&["a"]);
        let step = next_step(
            &mut queue,
            &song("c"),
            LoopMode::Single,
            false,
            AdvanceCause::NaturalEnd,
        );
        assert_eq!(step, NextStep::Replay);
        assert_eq!(titles(&queue), vec!["a"]);
    }

    #[test]
    fn test_skip_ignores_single_loop() {
        let mut queue = queue_of(&["a"]);
        let step = next_step(
            &mut queue,
            &song("c"),
            LoopMode::Single,
            false,
            AdvanceCause::Skip,
        );
        assert_eq!(step, NextStep::Play(song("a")));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_loop_rotates() {
        let mut queue = queue_of(&["a", "b"]);

        let step = next_step(
            &mut queue,
            &song("c"),
            LoopMode::Queue,
            false,
            AdvanceCause::NaturalEnd,
        );
        assert_eq!(step, NextStep::Play(song("a")));
        assert_eq!(titles(&queue), vec!["b", "c"]);

        let step = next_step(
            &mut queue,
            &song("a"),
            LoopMode::Queue,
            false,
            AdvanceCause::NaturalEnd,
        );
        assert_eq!(step, NextStep::Play(song("b")));
        assert_eq!(titles(&queue), vec!["c", "a"]);
    }

    #[test]
    fn test_lone_track_repeats_under_queue_loop() {
        let mut queue = TrackQueue::new(100);
        let step = next_step(
            &mut queue,
            &song("c"),
            LoopMode::Queue,
            true,
            AdvanceCause::NaturalEnd,
        );
        assert_eq!(step, NextStep::Play(song("c")));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_queue_falls_back_to_autoplay_or_idle() {
        let mut queue = TrackQueue::new(100);
        assert_eq!(
            next_step(&mut queue, &song("c"), LoopMode::Off, true, AdvanceCause::NaturalEnd),
            NextStep::Autoplay { seed: song("c") }
        );
        assert_eq!(
            next_step(&mut queue, &song("c"), LoopMode::Off, false, AdvanceCause::NaturalEnd),
            NextStep::Idle
        );
    }

    #[tokio::test]
    async fn test_autoplay_skips_same_title_and_failed_resolves() {
        let mut resolver = MockMetadataResolver::new();
        resolver
            .expect_search()
            .withf(|query, limit| query == "seed" && *limit == 5)
            .times(1)
            .returning(|_, _| {
                vec![
                    SearchResult::new("seed").with_webpage("https://yt/seed"),
                    SearchResult::new("broken").with_webpage("https://yt/broken"),
                    SearchResult::new("next").with_webpage("https://yt/next"),
                ]
            });
        resolver
            .expect_resolve()
            .withf(|query| query == "https://yt/broken")
            .times(1)
            .returning(|q| Err(PlaybackError::ResolveFailed(q.to_string())));
        resolver
            .expect_resolve()
            .withf(|query| query == "https://yt/next")
            .times(1)
            .returning(|_| Ok(StreamDescriptor::new("https://cdn/next", "next")));

        let chosen = autoplay_candidate(&resolver, &song("seed"), 5).await;
        assert_eq!(chosen.map(|d| d.title), Some("next".to_string()));
    }

    #[tokio::test]
    async fn test_autoplay_absorbs_empty_search() {
        let mut resolver = MockMetadataResolver::new();
        resolver.expect_search().returning(|_, _| Vec::new());
        resolver.expect_resolve().never();

        assert_eq!(autoplay_candidate(&resolver, &song("seed"), 5).await, None);
    }
}
