//! Transport channel: inline tokens observed as network request or response
//! addresses.

use blobtap::{looks_like_token, Candidate};

use crate::renderer::HostEvent;

/// The candidate a network event carries, if any.
pub fn transport_candidate(event: &HostEvent) -> Option<Candidate> {
    match event {
        HostEvent::Request(url) | HostEvent::Response(url) if looks_like_token(url) => {
            Some(Candidate::InlineToken(url.clone()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_addresses_become_candidates() {
        let url = "data:font/woff2;base64,d09GMg==".to_string();
        assert_eq!(
            transport_candidate(&HostEvent::Request(url.clone())),
            Some(Candidate::InlineToken(url.clone()))
        );
        assert_eq!(
            transport_candidate(&HostEvent::Response(url.clone())),
            Some(Candidate::InlineToken(url))
        );
    }

    #[test]
    fn test_ordinary_traffic_ignored() {
        assert!(transport_candidate(&HostEvent::Request("https://example.com/".into())).is_none());
        assert!(transport_candidate(&HostEvent::Response("data:text/plain,hi".into())).is_none());
        assert!(transport_candidate(&HostEvent::LoadCompleted).is_none());
    }
}
