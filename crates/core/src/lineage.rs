//! Lineage enrichment
//!
//! The enricher is the only place an [`EventId`] is minted. It consumes the
//! validated record so the same ingestion attempt cannot be enriched twice.

use crate::canonical::sha256_hex;
use crate::record::{EnrichedRecord, LineageMetadata, RawEvaluationRecord};
use crate::types::EventId;
use chrono::Utc;

/// Stamps validated records with provenance
#[derive(Debug, Clone)]
pub struct LineageEnricher {
    pipeline_version: String,
    schema_version: String,
    node_id: String,
}

impl LineageEnricher {
    /// Create an enricher with fixed deployment constants
    pub fn new(
        pipeline_version: impl Into<String>,
        schema_version: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        LineageEnricher {
            pipeline_version: pipeline_version.into(),
            schema_version: schema_version.into(),
            node_id: node_id.into(),
        }
    }

    /// Node identifier stamped into lineage
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Attach lineage to a validated record
    ///
    /// `payload` must be the exact bytes the record was decoded from.
    pub fn enrich(
        &self,
        record: RawEvaluationRecord,
        payload: &[u8],
        upstream_uri: &str,
    ) -> EnrichedRecord {
        EnrichedRecord {
            record,
            metadata: LineageMetadata {
                event_id: EventId::new(),
                ingest_timestamp: Utc::now(),
                payload_sha256: sha256_hex(payload),
                upstream_provenance_uri: upstream_uri.to_string(),
                pipeline_version: self.pipeline_version.clone(),
                schema_version: self.schema_version.clone(),
                processing_node_id: self.node_id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaValidator;

    const PAYLOAD: &[u8] = br#"{"evaluation_id":"e1","text_hash":"h1","overall_score":0.5,
        "logical_validity_score":0.5,"confidence_calibration":0.5,"bias_indicators":[],
        "uncertainty_acknowledgment":false,"processing_timestamp":"t","context":"c"}"#;

    #[test]
    fn test_enrich_stamps_lineage() {
        let record = SchemaValidator::default().decode(PAYLOAD).unwrap();
        let enricher = LineageEnricher::new("1.0.0", "1.0", "node-a");
        let enriched = enricher.enrich(record.clone(), PAYLOAD, "rep://upstream/1");

        assert_eq!(enriched.record, record);
        assert_eq!(enriched.metadata.payload_sha256, sha256_hex(PAYLOAD));
        assert_eq!(enriched.metadata.upstream_provenance_uri, "rep://upstream/1");
        assert_eq!(enriched.metadata.pipeline_version, "1.0.0");
        assert_eq!(enriched.metadata.schema_version, "1.0");
        assert_eq!(enriched.metadata.processing_node_id, "node-a");
    }

    #[test]
    fn test_each_enrichment_mints_new_event_id() {
        let record = SchemaValidator::default().decode(PAYLOAD).unwrap();
        let enricher = LineageEnricher::new("1.0.0", "1.0", "node-a");
        let a = enricher.enrich(record.clone(), PAYLOAD, "u");
        let b = enricher.enrich(record, PAYLOAD, "u");
        assert_ne!(a.event_id(), b.event_id());
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }
}
