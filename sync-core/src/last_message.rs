//! Last-message selection.
//!
//! A conversation points at the message with the highest index; equal
//! indices go to the lexicographically smallest identifier. Incremental
//! updates use [`supersedes`], full recomputation uses [`highest`], and both
//! apply the same ordering, so the pointer never depends on arrival order.

use sync_types::MessageRecord;

/// Whether `candidate` replaces `current` as the last message.
pub fn supersedes(candidate: &MessageRecord, current: Option<&MessageRecord>) -> bool {
    match current {
        None => true,
        Some(current) => {
            candidate.index > current.index
                || (candidate.index == current.index && candidate.identifier < current.identifier)
        }
    }
}

/// The message with the highest index, or `None` for an empty set.
pub fn highest<'a, I>(messages: I) -> Option<&'a MessageRecord>
where
    I: IntoIterator<Item = &'a MessageRecord>,
{
    messages.into_iter().fold(None, |best, candidate| {
        if supersedes(candidate, best) {
            Some(candidate)
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::RemoteId;

    fn message(id: &str, index: i64) -> MessageRecord {
        MessageRecord {
            identifier: RemoteId::new(id),
            conversation: RemoteId::new("c1"),
            index,
            is_sent: false,
            sent_at: None,
            received_at: None,
            sent_by_user_id: None,
        }
    }

    #[test]
    fn first_message_always_supersedes() {
        assert!(supersedes(&message("m1", 0), None));
    }

    #[test]
    fn higher_index_supersedes() {
        let current = message("m2", 2);
        assert!(supersedes(&message("m3", 3), Some(&current)));
        assert!(!supersedes(&message("m1", 1), Some(&current)));
    }

    #[test]
    fn lower_index_never_supersedes_even_with_smaller_identifier() {
        let current = message("mz", 5);
        assert!(!supersedes(&message("ma", 4), Some(&current)));
    }

    #[test]
    fn equal_index_goes_to_smaller_identifier() {
        let ma = message("ma", 2);
        let mb = message("mb", 2);
        assert!(supersedes(&ma, Some(&mb)));
        assert!(!supersedes(&mb, Some(&ma)));
        assert!(!supersedes(&ma, Some(&ma)));
    }

    #[test]
    fn highest_of_empty_is_none() {
        assert!(highest(std::iter::empty()).is_none());
    }

    #[test]
    fn highest_picks_max_index() {
        let messages = vec![message("a", 1), message("b", 7), message("c", 3)];
        assert_eq!(highest(&messages).unwrap().identifier, RemoteId::new("b"));
    }

    #[test]
    fn highest_breaks_ties_by_identifier() {
        let forward = vec![message("m2", 5), message("m1", 5)];
        let backward = vec![message("m1", 5), message("m2", 5)];
        assert_eq!(highest(&forward).unwrap().identifier, RemoteId::new("m1"));
        assert_eq!(highest(&backward).unwrap().identifier, RemoteId::new("m1"));
    }

    #[test]
    fn incremental_offers_agree_with_highest() {
        let arrivals = vec![
            message("mc", 3),
            message("mb", 4),
            message("md", 1),
            message("ma", 4),
        ];
        let mut current: Option<&MessageRecord> = None;
        for candidate in &arrivals {
            if supersedes(candidate, current) {
                current = Some(candidate);
            }
        }
        assert_eq!(current, highest(&arrivals));
        assert_eq!(current.unwrap().identifier, RemoteId::new("ma"));
    }
}
