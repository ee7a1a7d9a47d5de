use super::scenario::{Scenario, Step};
use super::{INFERENCE_MAE_TOL, PATCHES_MAE_TOL};

const TUTORIALS_REPO: &str = "https://github.com/remicres/otbtf_tutorials_resources.git";

fn sample_selection(order: u32, split: &str) -> Step {
    Step::exist(
        order,
        &format!("sample_selection_{split}"),
        format!(
            "otbcli_LabelImageSampleSelection \
             -inref $DATADIR/terrain_truth_epsg32654_{split}.tif \
             -nodata 255 \
             -outvec $TMPDIR/outvec_{split}.gpkg"
        ),
        &[format!("$TMPDIR/outvec_{split}.gpkg")],
    )
}

fn patches_extraction(order: u32, split: &str) -> Step {
    let patches = format!("s2_patches_{split}.tif");
    let labels = format!("s2_labels_{split}.tif");
    Step::compare(
        order,
        &format!("patches_extraction_{split}"),
        format!(
            "otbcli_PatchesExtraction \
             -source1.il $DATADIR/s2_stack.jp2 \
             -source1.out $TMPDIR/{patches} \
             -source1.patchsizex 16 \
             -source1.patchsizey 16 \
             -vec $TMPDIR/outvec_{split}.gpkg \
             -field class \
             -outlabels $TMPDIR/{labels}"
        ),
        &[
            (format!("$DATADIR/{patches}"), format!("$TMPDIR/{patches}")),
            (format!("$DATADIR/{labels}"), format!("$TMPDIR/{labels}")),
        ],
        PATCHES_MAE_TOL,
    )
}

fn generate_model(order: u32, model: &str, script: &str) -> Step {
    Step::exist(
        order,
        &format!("generate_{model}"),
        format!("python $TMPDIR/otbtf_tuto_repo/{script} $TMPDIR/{model}"),
        &[format!("$TMPDIR/{model}/saved_model.pb")],
    )
}

fn train_single_source(order: u32, model: &str) -> Step {
    Step::exist(
        order,
        &format!("{model}_train"),
        format!(
            "otbcli_TensorflowModelTrain \
             -training.source1.il $DATADIR/s2_patches_A.tif \
             -training.source1.patchsizex 16 \
             -training.source1.patchsizey 16 \
             -training.source1.placeholder x \
             -training.source2.il $DATADIR/s2_labels_A.tif \
             -training.source2.patchsizex 1 \
             -training.source2.patchsizey 1 \
             -training.source2.placeholder y \
             -model.dir $TMPDIR/{model} \
             -training.targetnodes optimizer \
             -training.epochs 10 \
             -validation.mode class \
             -validation.source1.il $DATADIR/s2_patches_B.tif \
             -validation.source1.name x \
             -validation.source2.il $DATADIR/s2_labels_B.tif \
             -validation.source2.name prediction \
             -model.saveto $TMPDIR/{model}/variables/variables"
        ),
        &[format!("$TMPDIR/{model}/variables/variables.index")],
    )
}

fn rf_sampling(order: u32, split: &str) -> Step {
    Step::exist(
        order,
        &format!("rf_sampling_{split}"),
        format!(
            "otbcli_SampleExtraction \
             -in $DATADIR/s2_stack.jp2 \
             -vec $TMPDIR/outvec_{split}.gpkg \
             -field class \
             -out $TMPDIR/pixelvalues_{split}.gpkg"
        ),
        &[format!("$TMPDIR/pixelvalues_{split}.gpkg")],
    )
}

fn patches_extraction_20m(order: u32, split: &str) -> Step {
    let labels = format!("s2_10m_labels_{split}.tif");
    let p10 = format!("s2_10m_patches_{split}.tif");
    let p20 = format!("s2_20m_patches_{split}.tif");
    Step::compare(
        order,
        &format!("patches_extraction_20m_{split}"),
        format!(
            "OTB_TF_NSOURCES=2 otbcli_PatchesExtraction \
             -source1.il $DATADIR/s2_20m_stack.jp2 \
             -source1.patchsizex 8 \
             -source1.patchsizey 8 \
             -source1.out $TMPDIR/{p20} \
             -source2.il $DATADIR/s2_stack.jp2 \
             -source2.patchsizex 16 \
             -source2.patchsizey 16 \
             -source2.out $TMPDIR/{p10} \
             -vec $TMPDIR/outvec_{split}.gpkg \
             -field class \
             -outlabels $TMPDIR/{labels} uint8"
        ),
        &[
            (format!("$DATADIR/{labels}"), format!("$TMPDIR/{labels}")),
            (format!("$DATADIR/{p10}"), format!("$TMPDIR/{p10}")),
            (format!("$DATADIR/{p20}"), format!("$TMPDIR/{p20}")),
        ],
        PATCHES_MAE_TOL,
    )
}

fn serve_two_sources(order: u32, name: &str, fully_conv: bool) -> Step {
    let output = format!("classif_{name}.tif");
    let fcn = if fully_conv { "-model.fullyconv on " } else { "" };
    Step::compare(
        order,
        &format!("{name}_inference"),
        format!(
            "OTB_TF_NSOURCES=2 otbcli_TensorflowModelServe \
             -source1.il $DATADIR/s2_20m_stack.jp2 \
             -source1.rfieldx 8 \
             -source1.rfieldy 8 \
             -source1.placeholder x1 \
             -source2.il $DATADIR/s2_stack.jp2 \
             -source2.rfieldx 16 \
             -source2.rfieldy 16 \
             -source2.placeholder x2 \
             -model.dir $TMPDIR/model3 \
             {fcn}-output.names prediction \
             -out \"$TMPDIR/{output}?&box=2000:2000:500:500&gdal:co:compress=deflate\""
        ),
        &[(format!("$DATADIR/{output}"), format!("$TMPDIR/{output}"))],
        INFERENCE_MAE_TOL,
    )
}

/// Patch-based classification tutorial: sample selection, patch extraction,
/// three models of increasing multi-source complexity trained and served,
/// random forest baselines, and a semantic segmentation model generation.
pub fn tutorial() -> Scenario {
    let steps = vec![
        sample_selection(1, "A"),
        sample_selection(1, "B"),
        patches_extraction(2, "A"),
        patches_extraction(2, "B"),
        Step::run_only(3, "clone_tutorials", format!("git clone {TUTORIALS_REPO} $TMPDIR/otbtf_tuto_repo")),
        generate_model(3, "model1", "01_patch_based_classification/models/create_model1.py"),
        train_single_source(4, "model1"),
        Step::compare(
            5,
            "model1_inference_pb",
            "otbcli_TensorflowModelServe \
             -source1.il $DATADIR/s2_stack.jp2 \
             -source1.rfieldx 16 \
             -source1.rfieldy 16 \
             -source1.placeholder x \
             -model.dir $TMPDIR/model1 \
             -output.names prediction \
             -out \"$TMPDIR/classif_model1.tif?&box=4000:4000:1000:1000\" uint8",
            &[("$DATADIR/classif_model1.tif", "$TMPDIR/classif_model1.tif")],
            INFERENCE_MAE_TOL,
        ),
        Step::compare(
            6,
            "model1_inference_fcn",
            "otbcli_TensorflowModelServe \
             -source1.il $DATADIR/s2_stack.jp2 \
             -source1.rfieldx 16 \
             -source1.rfieldy 16 \
             -source1.placeholder x \
             -model.dir $TMPDIR/model1 \
             -output.names prediction \
             -model.fullyconv on \
             -output.spcscale 4 \
             -out \"$TMPDIR/classif_model1.tif?&box=1000:1000:256:256\" uint8",
            &[("$DATADIR/classif_model1.tif", "$TMPDIR/classif_model1.tif")],
            INFERENCE_MAE_TOL,
        ),
        rf_sampling(7, "A"),
        rf_sampling(7, "B"),
        Step::exist(
            8,
            "rf_training",
            "otbcli_TrainVectorClassifier \
             -io.vd $TMPDIR/pixelvalues_A.gpkg \
             -valid.vd $TMPDIR/pixelvalues_B.gpkg \
             -feat value_0 value_1 value_2 value_3 \
             -cfield class \
             -classifier rf \
             -io.out $TMPDIR/randomforest_model.yaml",
            &["$TMPDIR/randomforest_model.yaml"],
        ),
        generate_model(9, "model2", "01_patch_based_classification/models/create_model2.py"),
        train_single_source(10, "model2"),
        Step::compare(
            11,
            "model2_inference_fcn",
            "otbcli_TensorflowModelServe \
             -source1.il $DATADIR/s2_stack.jp2 \
             -source1.rfieldx 16 \
             -source1.rfieldy 16 \
             -source1.placeholder x \
             -model.dir $TMPDIR/model2 \
             -model.fullyconv on \
             -output.names prediction \
             -out \"$TMPDIR/classif_model2.tif?&box=4000:4000:1000:1000\"",
            &[("$DATADIR/classif_model2.tif", "$TMPDIR/classif_model2.tif")],
            INFERENCE_MAE_TOL,
        ),
        Step::exist(
            12,
            "model2rf_train",
            "otbcli_TrainClassifierFromDeepFeatures \
             -source1.il $DATADIR/s2_stack.jp2 \
             -source1.rfieldx 16 \
             -source1.rfieldy 16 \
             -source1.placeholder x \
             -model.dir $TMPDIR/model2 \
             -model.fullyconv on \
             -optim.tilesizex 999999 \
             -optim.tilesizey 128 \
             -output.names features \
             -vd $TMPDIR/outvec_A.gpkg \
             -valid $TMPDIR/outvec_B.gpkg \
             -sample.vfn class \
             -sample.bm 0 \
             -classifier rf \
             -out $TMPDIR/RF_model_from_deep_features.yaml",
            &["$TMPDIR/RF_model_from_deep_features.yaml"],
        ),
        Step::compare(
            13,
            "model2rf_inference",
            "otbcli_ImageClassifierFromDeepFeatures \
             -source1.il $DATADIR/s2_stack.jp2 \
             -source1.rfieldx 16 \
             -source1.rfieldy 16 \
             -source1.placeholder x \
             -deepmodel.dir $TMPDIR/model2 \
             -deepmodel.fullyconv on \
             -output.names features \
             -model $TMPDIR/RF_model_from_deep_features.yaml \
             -out \"$TMPDIR/RF_model_from_deep_features_map.tif?&box=4000:4000:1000:1000\" uint8",
            &[(
                "$DATADIR/RF_model_from_deep_features_map.tif",
                "$TMPDIR/RF_model_from_deep_features_map.tif",
            )],
            INFERENCE_MAE_TOL,
        ),
        patches_extraction_20m(14, "A"),
        patches_extraction_20m(14, "B"),
        generate_model(15, "model3", "01_patch_based_classification/models/create_model3.py"),
        Step::exist(
            16,
            "model3_train",
            "OTB_TF_NSOURCES=2 otbcli_TensorflowModelTrain \
             -training.source1.il $DATADIR/s2_20m_patches_A.tif \
             -training.source1.patchsizex 8 \
             -training.source1.patchsizey 8 \
             -training.source1.placeholder x1 \
             -training.source2.il $DATADIR/s2_10m_patches_A.tif \
             -training.source2.patchsizex 16 \
             -training.source2.patchsizey 16 \
             -training.source2.placeholder x2 \
             -training.source3.il $DATADIR/s2_10m_labels_A.tif \
             -training.source3.patchsizex 1 \
             -training.source3.patchsizey 1 \
             -training.source3.placeholder y \
             -model.dir $TMPDIR/model3 \
             -training.targetnodes optimizer \
             -validation.mode class \
             -validation.source1.il $DATADIR/s2_20m_patches_B.tif \
             -validation.source1.name x1 \
             -validation.source2.il $DATADIR/s2_10m_patches_B.tif \
             -validation.source2.name x2 \
             -validation.source3.il $DATADIR/s2_10m_labels_B.tif \
             -validation.source3.name prediction \
             -model.saveto $TMPDIR/model3/variables/variables",
            &["$TMPDIR/model3/variables/variables.index"],
        ),
        serve_two_sources(17, "model3_pb", false),
        serve_two_sources(18, "model3_fcn", true),
        generate_model(19, "model4", "02_semantic_segmentation/models/create_model4.py"),
    ];
    Scenario::new("tutorial", steps)
}
