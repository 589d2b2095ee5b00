use super::{METADATA, MemoryCloud, TAGS};
use async_trait::async_trait;
use nimbus_cloud::{
    CloudError, Iid, KeyValue, MetadataStore, ResourceType, Result, TagBinder, validate_tag,
};
use std::collections::BTreeMap;

/// Tags are keyed by the system id when known, by name otherwise
fn tag_key(resource_type: ResourceType, iid: &Iid) -> Result<String> {
    let id = if iid.system_id.is_empty() {
        &iid.name_id
    } else {
        &iid.system_id
    };
    if id.is_empty() {
        return Err(CloudError::Validation(format!(
            "cannot tag a {} without an id",
            resource_type
        )));
    }
    Ok(format!("{}/{}", resource_type, id))
}

#[async_trait]
impl TagBinder for MemoryCloud {
    async fn add_tag(&self, resource_type: ResourceType, iid: &Iid, tag: &KeyValue) -> Result<KeyValue> {
        validate_tag(tag)?;
        let key = tag_key(resource_type, iid)?;
        self.scope().transaction(|tx| {
            if self.tags_failing(tx)? {
                return Err(CloudError::ApiError(format!("injected failure tagging {}", key)));
            }
            let mut tags: Vec<KeyValue> = tx.get(TAGS, &key)?.unwrap_or_default();
            match tags.iter_mut().find(|t| t.key == tag.key) {
                Some(existing) => existing.value = tag.value.clone(),
                None => tags.push(tag.clone()),
            }
            tx.put(TAGS, key.clone(), &tags)?;
            tracing::debug!("memory: tagged {} with {}", key, tag);
            Ok(tag.clone())
        })
    }

    async fn list_tags(&self, resource_type: ResourceType, iid: &Iid) -> Result<Vec<KeyValue>> {
        let key = tag_key(resource_type, iid)?;
        self.scope()
            .transaction(|tx| Ok(tx.get(TAGS, &key)?.unwrap_or_default()))
    }
}

#[async_trait]
impl MetadataStore for MemoryCloud {
    async fn put(&self, object_id: &str, key: &str, value: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            let mut entries: BTreeMap<String, String> =
                tx.get(METADATA, object_id)?.unwrap_or_default();
            entries.insert(key.to_string(), value.to_string());
            tx.put(METADATA, object_id, &entries)?;
            Ok(())
        })
    }

    async fn get(&self, object_id: &str, key: &str) -> Result<Option<String>> {
        self.scope().transaction(|tx| {
            let entries: Option<BTreeMap<String, String>> = tx.get(METADATA, object_id)?;
            Ok(entries.and_then(|mut e| e.remove(key)))
        })
    }

    async fn remove_all(&self, object_id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            tx.remove(METADATA, object_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tags_replace_by_key() {
        let cloud = MemoryCloud::isolated("t").unwrap();
        let iid = Iid::new("vpc-a", "net-1");

        cloud
            .add_tag(ResourceType::Vpc, &iid, &KeyValue::new("env", "dev"))
            .await
            .unwrap();
        cloud
            .add_tag(ResourceType::Vpc, &iid, &KeyValue::new("env", "prod"))
            .await
            .unwrap();

        let tags = cloud.list_tags(ResourceType::Vpc, &iid).await.unwrap();
        assert_eq!(tags, vec![KeyValue::new("env", "prod")]);
        assert!(cloud
            .list_tags(ResourceType::Subnet, &iid)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_tag_rules_and_faults() {
        let cloud = MemoryCloud::isolated("t").unwrap();
        let iid = Iid::by_name("vpc-a");

        let err = cloud
            .add_tag(ResourceType::Vpc, &iid, &KeyValue::new("a=b", "c"))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        cloud.fail_tags(true).unwrap();
        let err = cloud
            .add_tag(ResourceType::Vpc, &iid, &KeyValue::new("env", "dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_side_table() {
        let cloud = MemoryCloud::isolated("t").unwrap();
        cloud.put("pool-1", "vmgroupport", "8080").await.unwrap();
        assert_eq!(
            cloud.get("pool-1", "vmgroupport").await.unwrap().as_deref(),
            Some("8080")
        );

        cloud.remove_all("pool-1").await.unwrap();
        assert_eq!(cloud.get("pool-1", "vmgroupport").await.unwrap(), None);
    }
}
