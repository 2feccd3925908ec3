//! Resolver-side answer selection
//!
//! Models how a participating resolver picks among regional alias records
//! using nothing but each region's health-check state. Unhealthy regions are
//! withheld; if every region is unhealthy, all are returned (fail open).

use serde::{Deserialize, Serialize};

use super::types::DnsRecord;

/// One region's alias record and the health check guarding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalAnswer {
    pub region: String,
    pub record: DnsRecord,
    pub health_check_id: Option<String>,
}

/// Answers a resolver would hand out given per-answer health
pub fn select_answers<'a, F>(candidates: &'a [RegionalAnswer], is_healthy: F) -> Vec<&'a RegionalAnswer>
where
    F: Fn(&RegionalAnswer) -> bool,
{
    let healthy: Vec<&RegionalAnswer> = candidates
        .iter()
        // Records without a check are always eligible
        .filter(|answer| answer.health_check_id.is_none() || is_healthy(answer))
        .collect();

    if healthy.is_empty() {
        candidates.iter().collect()
    } else {
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsRecordType;

    fn answer(region: &str, check: Option<&str>) -> RegionalAnswer {
        RegionalAnswer {
            region: region.to_string(),
            record: DnsRecord::alias(
                "Z0ABC",
                DnsRecordType::A,
                "api.example.org",
                &format!("d-{}.execute-api.{}.amazonaws.com", region, region),
                "Z1UJRXOUMOOFQ8",
            ),
            health_check_id: check.map(str::to_string),
        }
    }

    #[test]
    fn test_unhealthy_region_withheld() {
        let candidates = vec![answer("us-east-1", Some("hc-1")), answer("us-west-2", Some("hc-2"))];

        let selected = select_answers(&candidates, |a| a.region != "us-east-1");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].region, "us-west-2");
    }

    #[test]
    fn test_all_unhealthy_fails_open() {
        let candidates = vec![answer("us-east-1", Some("hc-1")), answer("us-west-2", Some("hc-2"))];

        let selected = select_answers(&candidates, |_| false);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_unchecked_record_always_eligible() {
        let candidates = vec![answer("us-east-1", None), answer("us-west-2", Some("hc-2"))];

        let selected = select_answers(&candidates, |_| false);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].region, "us-east-1");
    }
}
