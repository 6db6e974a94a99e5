//! A `ClusterApi` backed by a real Kubernetes-compatible cluster.
//!
//! The lock CRD is schema-less (an arbitrary `data` bag), so this targets it through
//! [`kube::core::DynamicObject`] against an [`ApiResource`] built from the fixed
//! `armada.process/v1` `Resource` kind, rather than a generated, strongly-typed CRD
//! struct.

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceColumnDefinition, CustomResourceConversion, CustomResourceDefinition,
    CustomResourceDefinitionNames, CustomResourceDefinitionSpec, CustomResourceDefinitionVersion,
    CustomResourceValidation, JSONSchemaProps,
};
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, instrument};

use super::{ClusterApi, ClusterObject, GROUP, KIND, NAMESPACE, PLURAL, SINGULAR, VERSION};
use crate::error::ClusterApiError;

/// `ClusterApi` implementation backed by a live `kube::Client`.
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(GROUP, VERSION, KIND);
        let resource = ApiResource::from_gvk(&gvk);
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }

    fn to_object(dyn_obj: DynamicObject) -> ClusterObject {
        let name = dyn_obj.metadata.name.clone().unwrap_or_default();
        let uid = dyn_obj.metadata.uid.clone().unwrap_or_default();
        let resource_version = dyn_obj.metadata.resource_version.clone().unwrap_or_default();
        let data = dyn_obj
            .data
            .get("data")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        ClusterObject { name, uid, resource_version, data }
    }

    fn from_object(body: &ClusterObject) -> DynamicObject {
        let data_map: serde_json::Map<String, serde_json::Value> = body
            .data
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let mut obj = DynamicObject::new(
            &body.name,
            &ApiResource::from_gvk(&GroupVersionKind::gvk(GROUP, VERSION, KIND)),
        );
        obj.metadata = ObjectMeta {
            name: Some(body.name.clone()),
            ..Default::default()
        };
        if !body.resource_version.is_empty() {
            obj.metadata.resource_version = Some(body.resource_version.clone());
        }
        obj.data = json!({ "data": data_map });
        obj
    }

    fn classify_kube_error(err: kube::Error) -> ClusterApiError {
        if let kube::Error::Api(resp) = &err {
            match resp.code {
                404 => return ClusterApiError::NotFound,
                409 => return ClusterApiError::Conflict,
                _ => {}
            }
        }
        ClusterApiError::Other(err.to_string())
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    #[instrument(skip(self, body), fields(name = %body.name))]
    async fn create_custom_resource(
        &self,
        _group: &str,
        _version: &str,
        namespace: &str,
        _plural: &str,
        body: ClusterObject,
    ) -> Result<ClusterObject, ClusterApiError> {
        let obj = Self::from_object(&body);
        let created = self
            .api(namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(Self::classify_kube_error)?;
        Ok(Self::to_object(created))
    }

    #[instrument(skip(self), fields(%name))]
    async fn read_custom_resource(
        &self,
        _group: &str,
        _version: &str,
        namespace: &str,
        _plural: &str,
        name: &str,
    ) -> Result<ClusterObject, ClusterApiError> {
        let obj = self
            .api(namespace)
            .get(name)
            .await
            .map_err(Self::classify_kube_error)?;
        Ok(Self::to_object(obj))
    }

    #[instrument(skip(self, body), fields(%name))]
    async fn replace_custom_resource(
        &self,
        _group: &str,
        _version: &str,
        namespace: &str,
        _plural: &str,
        name: &str,
        body: ClusterObject,
    ) -> Result<ClusterObject, ClusterApiError> {
        let obj = Self::from_object(&body);
        let replaced = self
            .api(namespace)
            .replace(name, &PostParams::default(), &obj)
            .await
            .map_err(Self::classify_kube_error)?;
        Ok(Self::to_object(replaced))
    }

    #[instrument(skip(self), fields(%name))]
    async fn delete_custom_resource(
        &self,
        _group: &str,
        _version: &str,
        namespace: &str,
        _plural: &str,
        name: &str,
    ) -> Result<(), ClusterApiError> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(Self::classify_kube_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_custom_resource_definition(
        &self,
        group: &str,
        version: &str,
        plural: &str,
        singular: &str,
        kind: &str,
    ) -> Result<(), ClusterApiError> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let crd_name = format!("{plural}.{group}");

        let existing = crds
            .list(&ListParams::default().fields(&format!("metadata.name={crd_name}")))
            .await
            .map_err(Self::classify_kube_error)?;
        if existing.items.iter().any(|c| c.name_any() == crd_name) {
            return Ok(());
        }

        let crd = CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(crd_name.clone()),
                ..Default::default()
            },
            spec: CustomResourceDefinitionSpec {
                group: group.to_string(),
                names: CustomResourceDefinitionNames {
                    plural: plural.to_string(),
                    singular: Some(singular.to_string()),
                    kind: kind.to_string(),
                    ..Default::default()
                },
                scope: "Namespaced".to_string(),
                versions: vec![CustomResourceDefinitionVersion {
                    name: version.to_string(),
                    served: true,
                    storage: true,
                    schema: Some(CustomResourceValidation {
                        open_apiv3_schema: Some(JSONSchemaProps {
                            type_: Some("object".to_string()),
                            x_kubernetes_preserve_unknown_fields: Some(true),
                            ..Default::default()
                        }),
                    }),
                    additional_printer_columns: Vec::<CustomResourceColumnDefinition>::new(),
                    ..Default::default()
                }],
                conversion: Some(CustomResourceConversion {
                    strategy: "None".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            status: None,
        };

        match crds.create(&PostParams::default(), &crd).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                debug!("CRD {crd_name} already exists, treating as installed");
                Ok(())
            }
            Err(kube::Error::Api(resp))
                if resp.message.to_lowercase().contains("null") && resp.message.to_lowercase().contains("condition") =>
            {
                Err(ClusterApiError::ValidationQuirk)
            }
            Err(e) => Err(ClusterApiError::Other(e.to_string())),
        }
    }
}
