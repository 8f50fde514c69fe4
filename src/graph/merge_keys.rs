//! Per-type merge key tables (SPEC_FULL.md §4.2, spec.md §4.2/§3 I2/I3).

use crate::types::{EdgeType, EntityType};

/// Node merge key priority: first non-null identifier wins, falling back
/// to `(name, jurisdiction)`. Reproduces the table in spec.md §4.2.
pub fn node_merge_key_fields(entity_type: EntityType) -> &'static [&'static str] {
	match entity_type {
		EntityType::Organization => &["ein", "bn", "sec_cik", "canada_corp_num", "meta_page_id", "name+jurisdiction"],
		EntityType::Person => &["irs_990_name", "opencorp_officer_id", "sec_cik", "name"],
		EntityType::Outlet => &["primary_domain", "name"],
		EntityType::Sponsor => &["meta_page_id", "name"],
		EntityType::Ad => &["platform+platform_ad_id"],
		EntityType::Government => &["name+jurisdiction"],
		EntityType::Vendor => &["name"],
		EntityType::Domain => &["domain"],
	}
}

/// Edge merge key tuple shape (spec.md §3 I2). Returned as the property
/// names whose values, together with `(source_id, target_id)` where
/// relevant, determine upsert identity.
pub fn edge_merge_key_fields(edge_type: EdgeType) -> &'static [&'static str] {
	match edge_type {
		EdgeType::FundedBy => &["source_id", "target_id", "fiscal_year"],
		EdgeType::DirectorOf | EdgeType::EmployedBy => &["source_id", "target_id"],
		EdgeType::Owns => &["source_id", "target_id"],
		EdgeType::SponsoredBy => &["source_id", "target_id"],
		EdgeType::SharedInfra => &["source_id", "target_id"], // undirected, checked both ways
		EdgeType::LobbiesFor | EdgeType::Lobbied => &["registration_id"],
		EdgeType::BeneficialOwnerOf => &["source_id", "target_id"],
		EdgeType::ContributedTo => &["source_id", "target_id", "date_received"],
		EdgeType::RegisteredFor => &["source_id", "target_id"],
		EdgeType::AdvertisedOn => &["source_id", "target_id"],
		EdgeType::LitigatedWith => &["case_reference"],
		EdgeType::SecuredBy => &["registration_number"],
	}
}
