//! A small kubebuilder project with `Workflow` and `Storage` at `v1alpha1`.
//!
//! It looks like a repository that has never been bumped: one API version,
//! no conversion routines yet, and a validating webhook on `Workflow`. The
//! repository imports its API as `dwsv1alpha1`, not under the group name
//! kubebuilder would choose.

use crate::sandbox::{FixtureRepo, Sandbox};

pub const MODULE: &str = "github.com/DataWorkflowServices/dws";
pub const GROUP: &str = "dataworkflowservices";
pub const ALIAS: &str = "dws";
pub const KINDS: &[&str] = &["Storage", "Workflow"];

pub const BOILERPLATE: &str = r#"/*
 * Copyright 2024 Hewlett Packard Enterprise Development LP
 * Other additional copyright holders may be indicated within.
 *
 * The entirety of this work is licensed under the Apache License,
 * Version 2.0 (the "License"); you may not use this file except
 * in compliance with the License.
 */
"#;

pub const PROJECT: &str = r#"# Code generated by tool. DO NOT EDIT.
# This file is used to track the info used to scaffold your project
# and allow the plugins properly work.
# More info: https://book.kubebuilder.io/reference/project-config.html
domain: github.io
layout:
- go.kubebuilder.io/v4
projectName: dws
repo: github.com/DataWorkflowServices/dws
resources:
- api:
    crdVersion: v1
    namespaced: true
  controller: true
  domain: github.io
  group: dataworkflowservices
  kind: Workflow
  path: github.com/DataWorkflowServices/dws/api/v1alpha1
  version: v1alpha1
  webhooks:
    validation: true
    webhookVersion: v1
- api:
    crdVersion: v1
    namespaced: true
  domain: github.io
  group: dataworkflowservices
  kind: Storage
  path: github.com/DataWorkflowServices/dws/api/v1alpha1
  version: v1alpha1
- controller: true
  domain: github.io
  group: lus
  kind: LustreFileSystem
  path: github.com/NearNodeFlash/lustre-fs-operator/api/v1beta1
  version: v1beta1
version: "3"
"#;

const GO_MOD: &str = r#"module github.com/DataWorkflowServices/dws

go 1.21

require (
	github.com/NearNodeFlash/lustre-fs-operator v0.0.1-0.20231031201943-531116c1194e
	github.com/onsi/ginkgo/v2 v2.13.0
	github.com/onsi/gomega v1.29.0
	k8s.io/apimachinery v0.28.3
	sigs.k8s.io/controller-runtime v0.16.3
)
"#;

const MAIN_GO: &str = r#"package main

import (
	"flag"
	"os"

	"k8s.io/apimachinery/pkg/runtime"
	utilruntime "k8s.io/apimachinery/pkg/util/runtime"
	clientgoscheme "k8s.io/client-go/kubernetes/scheme"
	ctrl "sigs.k8s.io/controller-runtime"

	dwsv1alpha1 "github.com/DataWorkflowServices/dws/api/v1alpha1"
	"github.com/DataWorkflowServices/dws/internal/controller"
	//+kubebuilder:scaffold:imports
)

var (
	scheme   = runtime.NewScheme()
	setupLog = ctrl.Log.WithName("setup")
)

func init() {
	utilruntime.Must(clientgoscheme.AddToScheme(scheme))

	utilruntime.Must(dwsv1alpha1.AddToScheme(scheme))
	//+kubebuilder:scaffold:scheme
}

func main() {
	flag.Parse()
	mgr, err := ctrl.NewManager(ctrl.GetConfigOrDie(), ctrl.Options{Scheme: scheme})
	if err != nil {
		os.Exit(1)
	}

	if err = (&controller.WorkflowReconciler{
		Client: mgr.GetClient(),
		Scheme: mgr.GetScheme(),
	}).SetupWithManager(mgr); err != nil {
		setupLog.Error(err, "unable to create controller", "controller", "Workflow")
		os.Exit(1)
	}
	if err = (&dwsv1alpha1.Workflow{}).SetupWebhookWithManager(mgr); err != nil {
		setupLog.Error(err, "unable to create webhook", "webhook", "Workflow")
		os.Exit(1)
	}
	//+kubebuilder:scaffold:builder
}
"#;

/// `api/<ver>/groupversion_info.go` as kubebuilder writes it.
pub fn groupversion_info(ver: &str) -> String {
    format!(
        r#"{BOILERPLATE}
// Package {ver} contains API Schema definitions for the dataworkflowservices {ver} API group
// +kubebuilder:object:generate=true
// +groupName=dataworkflowservices.github.io
package {ver}

import (
	"k8s.io/apimachinery/pkg/runtime/schema"
	"sigs.k8s.io/controller-runtime/pkg/scheme"
)

var (
	// GroupVersion is group version used to register these objects
	GroupVersion = schema.GroupVersion{{Group: "dataworkflowservices.github.io", Version: "{ver}"}}

	// SchemeBuilder is used to add go types to the GroupVersionKind scheme
	SchemeBuilder = &scheme.Builder{{GroupVersion: GroupVersion}}

	// AddToScheme adds the types in this group-version to the given scheme.
	AddToScheme = SchemeBuilder.AddToScheme
)
"#
    )
}

/// `api/<ver>/<kind>_types.go`. The storage-version marker, when wanted,
/// sits right after the status subresource marker, where the bump puts it.
pub fn types_go(ver: &str, kind: &str, storage_version: bool) -> String {
    let plural = format!("{}s", kind.to_lowercase());
    let storage = if storage_version {
        "// +kubebuilder:storageversion\n"
    } else {
        ""
    };
    format!(
        r#"{BOILERPLATE}
package {ver}

import (
	metav1 "k8s.io/apimachinery/pkg/apis/meta/v1"
)

// {kind}Spec defines the desired state of {kind}
type {kind}Spec struct {{
	DesiredState string `json:"desiredState,omitempty"`
}}

// {kind}Status defines the observed state of {kind}
type {kind}Status struct {{
	Ready bool `json:"ready"`
}}

//+kubebuilder:object:root=true
//+kubebuilder:subresource:status
{storage}
// {kind} is the Schema for the {plural} API
type {kind} struct {{
	metav1.TypeMeta   `json:",inline"`
	metav1.ObjectMeta `json:"metadata,omitempty"`

	Spec   {kind}Spec   `json:"spec,omitempty"`
	Status {kind}Status `json:"status,omitempty"`
}}

//+kubebuilder:object:root=true

// {kind}List contains a list of {kind}
type {kind}List struct {{
	metav1.TypeMeta `json:",inline"`
	metav1.ListMeta `json:"metadata,omitempty"`
	Items           []{kind} `json:"items"`
}}

func init() {{
	SchemeBuilder.Register(&{kind}{{}}, &{kind}List{{}})
}}
"#
    )
}

const WORKFLOW_HELPERS: &str = r#"package v1alpha1

// WorkflowState is the state a Workflow is moving toward.
type WorkflowState string

const (
	StateProposal WorkflowState = "Proposal"
	StateSetup    WorkflowState = "Setup"
	StateTeardown WorkflowState = "Teardown"
)
"#;

const WORKFLOW_WEBHOOK: &str = r#"package v1alpha1

import (
	ctrl "sigs.k8s.io/controller-runtime"
	logf "sigs.k8s.io/controller-runtime/pkg/log"
)

var workflowlog = logf.Log.WithName("workflow-resource")

func (r *Workflow) SetupWebhookWithManager(mgr ctrl.Manager) error {
	return ctrl.NewWebhookManagedBy(mgr).
		For(r).
		Complete()
}

//+kubebuilder:webhook:path=/validate-dataworkflowservices-github-io-v1alpha1-workflow,mutating=false,failurePolicy=fail,sideEffects=None,groups=dataworkflowservices.github.io,resources=workflows,verbs=create;update,versions=v1alpha1,name=vworkflow.kb.io,admissionReviewVersions=v1
"#;

const WORKFLOW_CONTROLLER: &str = r#"package controller

import (
	"context"

	"k8s.io/apimachinery/pkg/runtime"
	ctrl "sigs.k8s.io/controller-runtime"
	"sigs.k8s.io/controller-runtime/pkg/client"

	dwsv1alpha1 "github.com/DataWorkflowServices/dws/api/v1alpha1"
	lusv1beta1 "github.com/NearNodeFlash/lustre-fs-operator/api/v1beta1"
)

// WorkflowReconciler reconciles a Workflow object
type WorkflowReconciler struct {
	client.Client
	Scheme *runtime.Scheme
}

func (r *WorkflowReconciler) Reconcile(ctx context.Context, req ctrl.Request) (ctrl.Result, error) {
	workflow := &dwsv1alpha1.Workflow{}
	if err := r.Get(ctx, req.NamespacedName, workflow); err != nil {
		return ctrl.Result{}, client.IgnoreNotFound(err)
	}

	storages := &dwsv1alpha1.StorageList{}
	if err := r.List(ctx, storages); err != nil {
		return ctrl.Result{}, err
	}
	return ctrl.Result{}, nil
}

func (r *WorkflowReconciler) SetupWithManager(mgr ctrl.Manager) error {
	return ctrl.NewControllerManagedBy(mgr).
		For(&dwsv1alpha1.Workflow{}).
		Owns(&lusv1beta1.LustreFileSystem{}).
		Complete(r)
}
"#;

const SUITE_TEST: &str = r#"package controller

import (
	"testing"

	. "github.com/onsi/ginkgo/v2"
	. "github.com/onsi/gomega"

	"k8s.io/client-go/kubernetes/scheme"
	ctrl "sigs.k8s.io/controller-runtime"
	"sigs.k8s.io/controller-runtime/pkg/envtest"

	dwsv1alpha1 "github.com/DataWorkflowServices/dws/api/v1alpha1"
	//+kubebuilder:scaffold:imports
)

var testEnv *envtest.Environment

func TestControllers(t *testing.T) {
	RegisterFailHandler(Fail)
	RunSpecs(t, "Controller Suite")
}

var _ = BeforeSuite(func() {
	cfg, err := testEnv.Start()
	Expect(err).NotTo(HaveOccurred())

	err = dwsv1alpha1.AddToScheme(scheme.Scheme)
	Expect(err).NotTo(HaveOccurred())

	//+kubebuilder:scaffold:scheme

	k8sManager, err := ctrl.NewManager(cfg, ctrl.Options{Scheme: scheme.Scheme})
	Expect(err).ToNot(HaveOccurred())

	err = (&dwsv1alpha1.Workflow{}).SetupWebhookWithManager(k8sManager)
	Expect(err).ToNot(HaveOccurred())

	// +crdbumper:scaffold:builder
})
"#;

const WEBHOOK_MANIFESTS: &str = r#"---
apiVersion: admissionregistration.k8s.io/v1
kind: ValidatingWebhookConfiguration
metadata:
  name: validating-webhook-configuration
webhooks:
- admissionReviewVersions:
  - v1
  clientConfig:
    service:
      name: webhook-service
      namespace: system
      path: /validate-dataworkflowservices-github-io-v1alpha1-workflow
  failurePolicy: Fail
  name: vworkflow.kb.io
  rules:
  - apiGroups:
    - dataworkflowservices.github.io
    apiVersions:
    - v1alpha1
    operations:
    - CREATE
    - UPDATE
    resources:
    - workflows
  sideEffects: None
"#;

const CRD_KUSTOMIZATION: &str = r#"resources:
- bases/dataworkflowservices.github.io_workflows.yaml
- bases/dataworkflowservices.github.io_storages.yaml
#+kubebuilder:scaffold:crdkustomizeresource

patches:
# [WEBHOOK] To enable webhook, uncomment all the sections with [WEBHOOK] prefix.
# patches here are for enabling the conversion webhook for each CRD
#- path: patches/webhook_in_workflows.yaml
#- path: patches/webhook_in_storages.yaml
#+kubebuilder:scaffold:crdkustomizewebhookpatch

# [CERTMANAGER] To enable cert-manager, uncomment all the sections with [CERTMANAGER] prefix.
# patches here are for enabling the CA injection for each CRD
#- path: patches/cainjection_in_workflows.yaml
#- path: patches/cainjection_in_storages.yaml
#+kubebuilder:scaffold:crdkustomizecainjectionpatch
"#;

const MAKEFILE: &str = r#"# The spoke API directories that conversion-gen reads.
SRC_DIRS=

.PHONY: generate-go-conversions
generate-go-conversions: $(CONVERSION_GEN) ## Generate conversions go code.
	$(MAKE) clean-generated-conversions SRC_DIRS="$(SRC_DIRS)"
	$(CONVERSION_GEN) --output-file=zz_generated.conversion.go $(SRC_DIRS)
"#;

const UTIL_CONVERSION_TEST: &str = r#"package conversion

import (
	"testing"

	. "github.com/onsi/gomega"

	metav1 "k8s.io/apimachinery/pkg/apis/meta/v1"
	"k8s.io/apimachinery/pkg/apis/meta/v1/unstructured"
	"k8s.io/apimachinery/pkg/runtime/schema"

	dwsv1alpha1 "github.com/DataWorkflowServices/dws/api/v1alpha1"
)

var (
	oldWorkflowGVK = schema.GroupVersionKind{
		Group:   dwsv1alpha1.GroupVersion.Group,
		Version: "v1old",
		Kind:    "Workflow",
	}

	// +crdbumper:scaffold:gvk
)

func TestMarshalData(t *testing.T) {
	g := NewWithT(t)

	t.Run("Workflow should write source object to destination", func(*testing.T) {
		src := &dwsv1alpha1.Workflow{
			ObjectMeta: metav1.ObjectMeta{Name: "test-1"},
		}
		dst := &unstructured.Unstructured{}
		dst.SetGroupVersionKind(oldWorkflowGVK)
		g.Expect(MarshalData(src, dst)).To(Succeed())
	})

	// +crdbumper:scaffold:marshaldata
}

func TestUnmarshalData(t *testing.T) {
	g := NewWithT(t)
	_ = g

	// +crdbumper:scaffold:unmarshaldata
}
"#;

/// Write the project into `repo` without committing.
pub fn write_project(repo: &FixtureRepo) {
    repo.write("PROJECT", PROJECT)
        .write("go.mod", GO_MOD)
        .write("Makefile", MAKEFILE)
        .write("hack/boilerplate.go.txt", BOILERPLATE)
        .write("cmd/main.go", MAIN_GO)
        .write("api/v1alpha1/groupversion_info.go", groupversion_info("v1alpha1"))
        .write("api/v1alpha1/workflow_types.go", types_go("v1alpha1", "Workflow", true))
        .write("api/v1alpha1/storage_types.go", types_go("v1alpha1", "Storage", true))
        .write("api/v1alpha1/workflow_helpers.go", WORKFLOW_HELPERS)
        .write("api/v1alpha1/workflow_webhook.go", WORKFLOW_WEBHOOK)
        .write("internal/controller/workflow_controller.go", WORKFLOW_CONTROLLER)
        .write("internal/controller/suite_test.go", SUITE_TEST)
        .write("config/webhook/manifests.yaml", WEBHOOK_MANIFESTS)
        .write("config/crd/kustomization.yaml", CRD_KUSTOMIZATION)
        .write(
            "github/cluster-api/util/conversion/conversion_test.go",
            UTIL_CONVERSION_TEST,
        );
}

/// A committed copy of the project at `rel` under the sandbox root.
pub fn kubebuilder_repo(sb: &Sandbox, rel: &str) -> FixtureRepo {
    let repo = sb.git_repo(rel);
    write_project(&repo);
    repo.commit("Initial project");
    repo
}
