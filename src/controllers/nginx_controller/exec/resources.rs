// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::NginxDeployment;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ObjectMeta, Resource};
use kube::ResourceExt;
use std::collections::BTreeMap;

pub const CONTAINER_NAME: &str = "nginx";

pub fn deployment_name(nd: &NginxDeployment) -> String {
    format!("{}-deployment", nd.name_any())
}

pub fn service_name(nd: &NginxDeployment) -> String {
    format!("{}-service", nd.name_any())
}

pub fn make_labels(nd: &NginxDeployment) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), nd.name_any())])
}

// The owner reference needs the parent's uid, so a parent that has not been
// persisted yet gets children without one.
pub fn make_owner_references(nd: &NginxDeployment) -> Option<Vec<metav1::OwnerReference>> {
    nd.controller_owner_ref(&()).map(|owner_ref| vec![owner_ref])
}

fn make_child_metadata(nd: &NginxDeployment, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: nd.namespace(),
        labels: Some(make_labels(nd)),
        owner_references: make_owner_references(nd),
        ..ObjectMeta::default()
    }
}

fn make_http_probe(port: i32, initial_delay_seconds: i32, timeout_seconds: i32) -> corev1::Probe {
    corev1::Probe {
        http_get: Some(corev1::HTTPGetAction {
            path: Some("/".to_string()),
            port: IntOrString::Int(port),
            ..corev1::HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        timeout_seconds: Some(timeout_seconds),
        ..corev1::Probe::default()
    }
}

fn make_nginx_pod_spec(nd: &NginxDeployment) -> corev1::PodSpec {
    let port = nd.spec.port();
    corev1::PodSpec {
        containers: vec![corev1::Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(nd.spec.image().to_string()),
            ports: Some(vec![corev1::ContainerPort {
                container_port: port,
                ..corev1::ContainerPort::default()
            }]),
            liveness_probe: Some(make_http_probe(port, 15, 5)),
            readiness_probe: Some(make_http_probe(port, 5, 5)),
            ..corev1::Container::default()
        }],
        ..corev1::PodSpec::default()
    }
}

pub fn make_deployment(nd: &NginxDeployment) -> appsv1::Deployment {
    appsv1::Deployment {
        metadata: make_child_metadata(nd, deployment_name(nd)),
        spec: Some(appsv1::DeploymentSpec {
            replicas: Some(nd.spec.replicas),
            selector: metav1::LabelSelector {
                match_labels: Some(make_labels(nd)),
                ..metav1::LabelSelector::default()
            },
            template: corev1::PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(make_labels(nd)),
                    ..ObjectMeta::default()
                }),
                spec: Some(make_nginx_pod_spec(nd)),
            },
            ..appsv1::DeploymentSpec::default()
        }),
        ..appsv1::Deployment::default()
    }
}

pub fn make_service(nd: &NginxDeployment) -> corev1::Service {
    let port = nd.spec.port();
    corev1::Service {
        metadata: make_child_metadata(nd, service_name(nd)),
        spec: Some(corev1::ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(make_labels(nd)),
            ports: Some(vec![corev1::ServicePort {
                port,
                target_port: Some(IntOrString::Int(port)),
                ..corev1::ServicePort::default()
            }]),
            ..corev1::ServiceSpec::default()
        }),
        ..corev1::Service::default()
    }
}

fn replicas_of(deployment: &appsv1::Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|spec| spec.replicas)
}

fn first_image_of(deployment: &appsv1::Deployment) -> Option<&str> {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod_spec| pod_spec.containers.first())
        .and_then(|container| container.image.as_deref())
}

/// Only replicas and the first container's image are compared;
/// other fields of the found Deployment are left as they are until one of these drifts.
pub fn deployment_drifted(found: &appsv1::Deployment, desired: &appsv1::Deployment) -> bool {
    replicas_of(found) != replicas_of(desired) || first_image_of(found) != first_image_of(desired)
}
