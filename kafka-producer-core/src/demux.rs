//! Response demultiplexer (spec §4.5). Pure functions over a batch of dispatch
//! units and one client reply — no actor or channel state lives here, so the
//! mapping from reply shape to per-unit outcome can be tested directly.

use crate::client::{Acks, ProduceReply, ProduceResponse};
use crate::dispatch::DispatchUnit;
use crate::error::ProducerError;

/// What should happen to one [`DispatchUnit`] once a reply has been interpreted:
/// either every submission it represents now has a final outcome, or it needs
/// another attempt.
pub(crate) enum DemuxOutcome {
    Resolved(DispatchUnit, Result<Option<ProduceResponse>, ProducerError>),
    Retry(DispatchUnit, ProducerError),
}

/// Split `units` against `reply` per the table in spec §4.5.
pub(crate) fn demultiplex(
    units: Vec<DispatchUnit>,
    reply: ProduceReply,
    acks: Acks,
) -> Vec<DemuxOutcome> {
    match reply {
        ProduceReply::Responses(responses) => demux_responses(units, responses, acks),
        ProduceReply::Partial(partial) => demux_partial(units, partial, acks),
    }
}

fn demux_responses(
    units: Vec<DispatchUnit>,
    responses: Vec<ProduceResponse>,
    acks: Acks,
) -> Vec<DemuxOutcome> {
    if responses.is_empty() {
        // Empty list: terminal NoResponseError when acks were requested, otherwise
        // every submission is fulfilled with the null success sentinel.
        return units
            .into_iter()
            .map(|unit| {
                let outcome = if acks == Acks::None {
                    Ok(None)
                } else {
                    Err(ProducerError::NoResponseError)
                };
                DemuxOutcome::Resolved(unit, outcome)
            })
            .collect();
    }

    units
        .into_iter()
        .map(|unit| match find_response(&responses, &unit) {
            Some(response) => DemuxOutcome::Resolved(unit, Ok(Some(response.clone()))),
            None => {
                tracing::warn!(
                    topic = %unit.topic,
                    partition = unit.partition,
                    "no produce response for in-flight partition; treating as no response"
                );
                DemuxOutcome::Resolved(unit, Err(ProducerError::NoResponseError))
            }
        })
        .collect()
}

fn demux_partial(
    units: Vec<DispatchUnit>,
    partial: crate::client::FailedPayloadsReply,
    _acks: Acks,
) -> Vec<DemuxOutcome> {
    let crate::client::FailedPayloadsReply { successful, failed } = partial;

    for response in &successful {
        if !units
            .iter()
            .any(|u| u.topic == response.topic && u.partition == response.partition)
        {
            tracing::warn!(
                topic = %response.topic,
                partition = response.partition,
                "produce response did not match any in-flight payload; discarding"
            );
        }
    }

    units
        .into_iter()
        .map(|unit| {
            if let Some(response) = find_response(&successful, &unit) {
                return DemuxOutcome::Resolved(unit, Ok(Some(response.clone())));
            }
            if let Some((_, err)) = failed
                .iter()
                .find(|(req, _)| req.topic == unit.topic && req.partition == unit.partition)
            {
                return DemuxOutcome::Retry(unit, err.clone());
            }
            tracing::warn!(
                topic = %unit.topic,
                partition = unit.partition,
                "in-flight partition absent from partial-failure reply; treating as no response"
            );
            DemuxOutcome::Resolved(unit, Err(ProducerError::NoResponseError))
        })
        .collect()
}

fn find_response<'a>(responses: &'a [ProduceResponse], unit: &DispatchUnit) -> Option<&'a ProduceResponse> {
    responses
        .iter()
        .find(|r| r.topic == unit.topic && r.partition == unit.partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FailedPayloadsReply;
    use crate::submission::QueuedSubmission;
    use bytes::Bytes;
    use std::sync::Arc;

    fn unit(topic: &str, partition: i32, id: u64) -> DispatchUnit {
        DispatchUnit {
            topic: Arc::from(topic),
            partition,
            submissions: vec![QueuedSubmission {
                id,
                messages: vec![Bytes::from_static(b"x")],
            }],
        }
    }

    #[test]
    fn full_response_list_resolves_every_unit() {
        let units = vec![unit("T", 23, 1)];
        let responses = vec![ProduceResponse {
            topic: Arc::from("T"),
            partition: 23,
            error_code: 0,
            offset: 10,
        }];
        let out = demultiplex(units, ProduceReply::Responses(responses), Acks::Leader);
        assert_eq!(out.len(), 1);
        match &out[0] {
            DemuxOutcome::Resolved(_, Ok(Some(resp))) => assert_eq!(resp.offset, 10),
            _ => panic!("expected resolved success"),
        }
    }

    #[test]
    fn empty_list_with_acks_none_resolves_with_null_sentinel() {
        let units = vec![unit("T", 23, 1)];
        let out = demultiplex(units, ProduceReply::Responses(vec![]), Acks::None);
        match &out[0] {
            DemuxOutcome::Resolved(_, Ok(None)) => {}
            _ => panic!("expected Ok(None)"),
        }
    }

    #[test]
    fn empty_list_with_acks_required_is_terminal_no_response() {
        let units = vec![unit("T", 23, 1)];
        let out = demultiplex(units, ProduceReply::Responses(vec![]), Acks::Leader);
        match &out[0] {
            DemuxOutcome::Resolved(_, Err(ProducerError::NoResponseError)) => {}
            _ => panic!("expected NoResponseError"),
        }
    }

    #[test]
    fn partial_failure_resolves_successful_and_retries_failed() {
        let units = vec![unit("T", 0, 1), unit("T", 1, 2)];
        let successful = vec![ProduceResponse {
            topic: Arc::from("T"),
            partition: 0,
            error_code: 0,
            offset: 10,
        }];
        let failed = vec![(
            crate::client::ProduceRequest {
                topic: Arc::from("T"),
                partition: 1,
                message_set: Bytes::new(),
            },
            ProducerError::BrokerNotAvailableError,
        )];
        let out = demultiplex(
            units,
            ProduceReply::Partial(FailedPayloadsReply { successful, failed }),
            Acks::Leader,
        );
        assert_eq!(out.len(), 2);
        let resolved = out
            .iter()
            .any(|o| matches!(o, DemuxOutcome::Resolved(u, Ok(Some(_))) if u.partition == 0));
        let retried = out
            .iter()
            .any(|o| matches!(o, DemuxOutcome::Retry(u, _) if u.partition == 1));
        assert!(resolved);
        assert!(retried);
    }
}
